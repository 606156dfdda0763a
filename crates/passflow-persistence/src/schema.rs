//! Esquema Diesel escrito a mano; debe coincidir con `migrations/`.

diesel::table! {
    flow_sessions (session_key) {
        session_key -> Text,
        flow_instance -> Uuid,
        flow_slug -> Text,
        status -> Text,
        version -> BigInt,
        last_updated -> Timestamptz,
        snapshot -> Jsonb,
    }
}

diesel::table! {
    flow_event_log (seq) {
        seq -> BigInt,
        flow_id -> Uuid,
        ts -> Timestamptz,
        event_type -> Text,
        payload -> Jsonb,
    }
}

diesel::allow_tables_to_appear_in_same_query!(flow_sessions, flow_event_log);
