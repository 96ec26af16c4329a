mod yacht;

pub(crate) use yacht::{datatype_to_bq_type, yacht_value_into_json};
