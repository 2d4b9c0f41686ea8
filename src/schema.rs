//! Handwritten Diesel schema declarations matching `migrations/`.

diesel::table! {
    pin_config (id) {
        id -> Integer,
        light_pin_in -> Nullable<Integer>,
        humidity_pin_in -> Nullable<Integer>,
        temperature_pin_in -> Nullable<Integer>,
        ultrasonic_trigger_pin_in -> Nullable<Integer>,
        ultrasonic_echo_pin_in -> Nullable<Integer>,
        soil_moisture_pin_in -> Nullable<Integer>,
        light_pin -> Nullable<Integer>,
        water_pin -> Nullable<Integer>,
        humidifier_pin -> Nullable<Integer>,
        heater_pin -> Nullable<Integer>,
        light_threshold -> Integer,
        humidity_threshold_low -> Integer,
        humidity_threshold_high -> Integer,
        temperature_threshold_low -> Integer,
        temperature_threshold_high -> Integer,
        water_level_threshold_low -> Integer,
        dry_soil_threshold -> Integer,
        watered_soil_threshold -> Integer,
        created_at -> Timestamp,
        updated_at -> Timestamp,
        revision -> Integer,
    }
}

diesel::table! {
    reading (id) {
        id -> Integer,
        timestamp -> Timestamp,
    }
}

diesel::table! {
    light_reading (id) {
        id -> Integer,
        light_level -> Double,
    }
}

diesel::table! {
    temperature_reading (id) {
        id -> Integer,
        temperature -> Double,
    }
}

diesel::table! {
    humidity_reading (id) {
        id -> Integer,
        humidity -> Double,
    }
}

diesel::table! {
    water_reading (id) {
        id -> Integer,
        water_level -> Double,
    }
}

diesel::table! {
    soil_moisture_reading (id) {
        id -> Integer,
        soil_moisture -> Double,
    }
}

diesel::table! {
    #[sql_name = "event_code"]
    event_codes (code) {
        code -> Integer,
        description -> Text,
    }
}

// `log` would shadow the logging crate inside this module
diesel::table! {
    #[sql_name = "log"]
    audit_log (id) {
        id -> Integer,
        timestamp -> Timestamp,
        event_code -> Integer,
    }
}

diesel::joinable!(light_reading -> reading (id));
diesel::joinable!(temperature_reading -> reading (id));
diesel::joinable!(humidity_reading -> reading (id));
diesel::joinable!(water_reading -> reading (id));
diesel::joinable!(soil_moisture_reading -> reading (id));
diesel::joinable!(audit_log -> event_codes (event_code));

diesel::allow_tables_to_appear_in_same_query!(
    pin_config,
    reading,
    light_reading,
    temperature_reading,
    humidity_reading,
    water_reading,
    soil_moisture_reading,
    event_codes,
    audit_log,
);
