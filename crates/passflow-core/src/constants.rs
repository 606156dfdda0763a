//! Constantes del motor de flujos.
//!
//! Agrupa las claves reservadas del `ContextStore` que comparten los stages y
//! la versión lógica del motor, que forma parte del fingerprint de cada plan.

/// Versión lógica del motor. Participa en el fingerprint del `FlowPlan`, de
/// modo que un cambio incompatible del planner invalida planes persistidos.
pub const ENGINE_VERSION: &str = "P1.0";

/// Usuario identificado pendiente de autenticar (referencia `user`).
pub const CTX_PENDING_USER: &str = "pending_user";
/// Contraseña enviada por el usuario. Siempre sensible.
pub const CTX_PASSWORD: &str = "password";
/// Datos recolectados por los stages `Prompt` / `Invitation`.
pub const CTX_PROMPT_DATA: &str = "prompt_data";
/// Sesión autenticada emitida por `UserLogin`.
pub const CTX_AUTHENTICATED_SESSION: &str = "authenticated_session";
/// Invitación consumida por el stage `Invitation`.
pub const CTX_INVITATION: &str = "invitation";
/// Secreto TOTP generado durante el setup (sensible hasta confirmar el device).
pub const CTX_OTP_TIME_SECRET: &str = "otp_time_secret";
/// Tokens estáticos generados durante el setup.
pub const CTX_OTP_STATIC_TOKENS: &str = "otp_static_tokens";
/// Token de verificación enviado por email.
pub const CTX_EMAIL_TOKEN: &str = "email_token";
/// Momento de expiración del token de email (RFC 3339).
pub const CTX_EMAIL_TOKEN_EXPIRES: &str = "email_token_expires";

/// El usuario aceptó los permisos del stage `Consent`.
pub const CTX_CONSENT_GIVEN: &str = "consent_given";
/// Email verificado por el stage `Email`.
pub const CTX_EMAIL_VERIFIED: &str = "email_verified";

/// Tipo de referencia usado para usuarios dentro del contexto.
pub const REF_USER: &str = "user";
/// Tipo de referencia usado para sesiones autenticadas.
pub const REF_SESSION: &str = "session";
