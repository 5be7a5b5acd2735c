use chrono::Utc;
use uuid::Uuid;

/// Collision-resistant object name: `<6 uuid chars>_<unix millis>[.<ext>]`.
pub fn rand_file_name(ext: &str) -> String {
    let uuid = Uuid::new_v4().to_string();
    let mut file_name = format!("{}_{}", uuid[..6].replace('-', ""), Utc::now().timestamp_millis());
    if !ext.is_empty() {
        file_name.push('.');
        file_name.push_str(ext);
    }
    file_name
}
