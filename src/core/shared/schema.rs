diesel::table! {
    users (id) {
        id -> Uuid,
        email -> Text,
        name -> Text,
        profile_image_url -> Nullable<Text>,
        password_hash -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    sessions (token_digest) {
        token_digest -> Text,
        user_id -> Uuid,
        expires_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    leads (id) {
        id -> Uuid,
        user_id -> Uuid,
        name -> Text,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
        budget_min -> Nullable<Float8>,
        budget_max -> Nullable<Float8>,
        preferred_locations -> Array<Text>,
        property_types -> Array<Text>,
        timeline -> Nullable<Text>,
        source -> Nullable<Text>,
        status -> Text,
        score -> Int4,
        temperature -> Nullable<Text>,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    properties (id) {
        id -> Uuid,
        user_id -> Uuid,
        title -> Text,
        description -> Nullable<Text>,
        address -> Text,
        city -> Text,
        state -> Nullable<Text>,
        zip_code -> Nullable<Text>,
        property_type -> Text,
        status -> Text,
        price -> Float8,
        bedrooms -> Nullable<Int4>,
        bathrooms -> Nullable<Float8>,
        square_feet -> Nullable<Int4>,
        features -> Array<Text>,
        images -> Array<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    deals (id) {
        id -> Uuid,
        user_id -> Uuid,
        lead_id -> Uuid,
        property_id -> Uuid,
        status -> Text,
        deal_value -> Nullable<Float8>,
        offer_amount -> Nullable<Float8>,
        commission -> Nullable<Float8>,
        expected_close_date -> Nullable<Date>,
        actual_close_date -> Nullable<Date>,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    tasks (id) {
        id -> Uuid,
        user_id -> Uuid,
        lead_id -> Nullable<Uuid>,
        property_id -> Nullable<Uuid>,
        title -> Text,
        description -> Nullable<Text>,
        task_type -> Text,
        priority -> Text,
        status -> Text,
        due_date -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        reminder_sent_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    activities (id) {
        id -> Uuid,
        user_id -> Uuid,
        activity_type -> Text,
        title -> Text,
        description -> Nullable<Text>,
        lead_id -> Nullable<Uuid>,
        property_id -> Nullable<Uuid>,
        deal_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    notifications (id) {
        id -> Uuid,
        user_id -> Uuid,
        notification_type -> Text,
        title -> Text,
        message -> Text,
        action_url -> Nullable<Text>,
        entity_type -> Nullable<Text>,
        entity_id -> Nullable<Uuid>,
        metadata -> Jsonb,
        is_read -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    communications (id) {
        id -> Uuid,
        user_id -> Uuid,
        lead_id -> Uuid,
        comm_type -> Text,
        direction -> Text,
        subject -> Nullable<Text>,
        content -> Text,
        status -> Text,
        scheduled_for -> Nullable<Timestamptz>,
        metadata -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    lead_property_matches (id) {
        id -> Uuid,
        lead_id -> Uuid,
        property_id -> Uuid,
        score -> Int4,
        reasons -> Array<Text>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(sessions -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    sessions,
    leads,
    properties,
    deals,
    tasks,
    activities,
    notifications,
    communications,
    lead_property_matches,
);
