diesel::table! {
    hub_post (id) {
        id -> Int4,
        #[max_length = 255]
        name -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    hub_user (id) {
        id -> Text,
        name -> Text,
        email -> Text,
        email_verified -> Bool,
        image -> Nullable<Text>,
        role -> Text,
        banned -> Bool,
        ban_reason -> Nullable<Text>,
        ban_expires -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    hub_session (id) {
        id -> Text,
        token -> Text,
        ip_address -> Nullable<Text>,
        user_agent -> Nullable<Text>,
        user_id -> Text,
        expires_at -> Timestamptz,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    hub_account (id) {
        id -> Text,
        account_id -> Text,
        provider_id -> Text,
        access_token -> Nullable<Text>,
        refresh_token -> Nullable<Text>,
        access_token_expires_at -> Nullable<Timestamptz>,
        scope -> Nullable<Text>,
        user_id -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    hub_verification (id) {
        id -> Text,
        identifier -> Text,
        value -> Text,
        expires_at -> Timestamptz,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    hub_ticket (id) {
        id -> Int4,
        description -> Text,
        reason -> Text,
        status -> Text,
        user_id -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(hub_session -> hub_user (user_id));
diesel::joinable!(hub_account -> hub_user (user_id));
diesel::joinable!(hub_ticket -> hub_user (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    hub_post,
    hub_user,
    hub_session,
    hub_account,
    hub_verification,
    hub_ticket,
);
