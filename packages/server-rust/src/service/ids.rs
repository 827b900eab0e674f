/// Generates a record id of the form `<prefix>_<16 hex chars>`.
#[must_use]
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", hex::encode(rand::random::<[u8; 8]>()))
}

/// Trims `id`, replacing a blank value with a generated one.
#[must_use]
pub fn id_or_new(id: &str, prefix: &str) -> String {
    let id = id.trim();
    if id.is_empty() {
        new_id(prefix)
    } else {
        id.to_string()
    }
}
