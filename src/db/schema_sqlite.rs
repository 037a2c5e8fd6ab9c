diesel::table! {
    channel_mappings (id) {
        id -> Integer,
        slack_channel_id -> Text,
        irc_channel -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    user_mappings (id) {
        id -> Integer,
        slack_user_id -> Text,
        irc_nick -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    thread_timestamps (thread_ts) {
        thread_ts -> Text,
        thread_id -> Text,
        slack_channel_id -> Text,
        last_message_time -> BigInt,
    }
}

diesel::allow_tables_to_appear_in_same_query!(channel_mappings, user_mappings, thread_timestamps);
