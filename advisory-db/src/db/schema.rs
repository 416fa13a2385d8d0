diesel::table! {
    advisories (id) {
        id -> Text,
        summary -> Text,
        published_at -> Nullable<Text>,
        last_modified_at -> Nullable<Text>,
        severity_score -> Nullable<Double>,
        severity_vector -> Nullable<Text>,
        ingested_at -> Text,
        raw_payload -> Text,
    }
}

diesel::table! {
    cpes (id) {
        id -> Integer,
        advisory_id -> Text,
        uri -> Text,
        part -> Nullable<Text>,
        vendor -> Nullable<Text>,
        product -> Nullable<Text>,
        version -> Nullable<Text>,
    }
}

diesel::joinable!(cpes -> advisories (advisory_id));

diesel::allow_tables_to_appear_in_same_query!(advisories, cpes,);
