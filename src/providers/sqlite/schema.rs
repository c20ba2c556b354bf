diesel::table! {
    messages (id) {
        id -> Integer,
        user_id -> Text,
        role -> Text,
        content -> Text,
        timestamp -> BigInt,
    }
}

diesel::table! {
    transactions (id) {
        id -> Integer,
        user_id -> Text,
        date -> Text,
        kind -> Text,
        amount -> Text,
        currency -> Text,
        category -> Nullable<Text>,
        description -> Nullable<Text>,
        payment_method -> Nullable<Text>,
        payment_source -> Nullable<Text>,
    }
}

diesel::table! {
    holdings (id) {
        id -> Integer,
        user_id -> Text,
        asset_type -> Text,
        ticker -> Text,
        ticker_key -> Text,
        name -> Nullable<Text>,
        shares -> Text,
        avg_cost -> Text,
        currency -> Text,
        platform -> Nullable<Text>,
        notes -> Nullable<Text>,
        last_updated -> BigInt,
    }
}

diesel::table! {
    activities (id) {
        id -> Integer,
        user_id -> Text,
        date -> Text,
        activity_type -> Text,
        ticker -> Nullable<Text>,
        shares -> Nullable<Text>,
        price_per_unit -> Nullable<Text>,
        total_amount -> Nullable<Text>,
        currency -> Text,
        platform -> Nullable<Text>,
        realized_gain -> Nullable<Text>,
        notes -> Nullable<Text>,
    }
}

diesel::table! {
    memories (id) {
        id -> Integer,
        user_id -> Text,
        fact -> Text,
        category -> Text,
        created_at -> BigInt,
    }
}
