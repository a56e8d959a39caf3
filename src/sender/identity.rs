use crate::config::SenderConfig;

/// Stable device identity: explicit config value, else the persisted one,
/// else a freshly generated `<name>-<uuid8>` written for next time.
pub fn device_identity(config: &SenderConfig) -> String {
    if let Some(id) = &config.device_id {
        return id.clone();
    }

    if let Ok(saved) = std::fs::read_to_string(&config.id_file) {
        let saved = saved.trim();
        if !saved.is_empty() {
            return saved.to_string();
        }
    }

    let short = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
    let name = config.device_name.as_deref().unwrap_or("device");
    let id = format!("{}-{}", name, short);
    if let Err(e) = std::fs::write(&config.id_file, &id) {
        log::warn!("could not persist device id: {}", e);
    }
    id
}
