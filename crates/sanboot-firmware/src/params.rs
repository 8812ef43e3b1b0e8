//! Driver parameters.

use tracing::{info, warn};

use crate::boottext::BootTextConfig;
use crate::registry::{key_path, RegistryStore};

/// Name of the subkey under the service key that holds the parameters.
pub const PARAMETERS_SUBKEY: &str = "Parameters";

pub const BOOT_TEXT_VALUE: &str = "BootText";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverParameters {
    pub boot_text_enabled: bool,
}

impl Default for DriverParameters {
    fn default() -> Self {
        Self {
            boot_text_enabled: true,
        }
    }
}

impl DriverParameters {
    /// Load the parameters stored under `<service_key>\Parameters`.
    ///
    /// Missing or unreadable values keep their defaults; nothing here is fatal.
    pub fn load<R>(registry: &R, service_key: &str) -> Self
    where
        R: RegistryStore + ?Sized,
    {
        let mut params = Self::default();
        let key = key_path(&[service_key, PARAMETERS_SUBKEY]);
        match registry.fetch_dword(&key, BOOT_TEXT_VALUE) {
            Ok(value) => {
                params.boot_text_enabled = value != 0;
                info!(
                    "Boot screen text is {}",
                    if params.boot_text_enabled {
                        "enabled"
                    } else {
                        "disabled"
                    }
                );
            }
            Err(err) => warn!("Could not read {BOOT_TEXT_VALUE} parameter: {err}"),
        }
        params
    }

    pub fn boot_text_config(&self, load_options: &str) -> BootTextConfig {
        BootTextConfig {
            guiboot_enabled: guiboot_enabled(load_options),
            boot_text_enabled: self.boot_text_enabled,
        }
    }
}

/// Graphical boot is on unless the OS load options carry the `NOGUIBOOT`
/// switch.
pub fn guiboot_enabled(load_options: &str) -> bool {
    !load_options
        .split_whitespace()
        .map(|opt| opt.trim_start_matches('/'))
        .any(|opt| opt.eq_ignore_ascii_case("NOGUIBOOT"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemoryRegistry, RegistryValue};

    const SERVICE: &str = "\\Registry\\Machine\\SYSTEM\\CurrentControlSet\\Services\\sanbootconf";

    #[test]
    fn boot_text_defaults_to_enabled() {
        let reg = MemoryRegistry::new();
        assert!(DriverParameters::load(&reg, SERVICE).boot_text_enabled);

        let mut reg = MemoryRegistry::new();
        reg.create_key(&format!("{SERVICE}\\Parameters"));
        assert!(DriverParameters::load(&reg, SERVICE).boot_text_enabled);
    }

    #[test]
    fn boot_text_can_be_disabled() {
        let mut reg = MemoryRegistry::new();
        let key = format!("{SERVICE}\\Parameters");
        reg.create_key(&key);
        reg.store(&key, "BootText", RegistryValue::Dword(0)).unwrap();
        assert!(!DriverParameters::load(&reg, SERVICE).boot_text_enabled);

        reg.store(&key, "BootText", RegistryValue::Dword(7)).unwrap();
        assert!(DriverParameters::load(&reg, SERVICE).boot_text_enabled);
    }

    #[test]
    fn wrong_type_keeps_default() {
        let mut reg = MemoryRegistry::new();
        let key = format!("{SERVICE}\\Parameters");
        reg.create_key(&key);
        reg.store(&key, "BootText", RegistryValue::Sz("0".into()))
            .unwrap();
        assert!(DriverParameters::load(&reg, SERVICE).boot_text_enabled);
    }

    #[test]
    fn noguiboot_switch() {
        assert!(guiboot_enabled(""));
        assert!(guiboot_enabled("/FASTDETECT /SOS"));
        assert!(!guiboot_enabled("/FASTDETECT /NOGUIBOOT"));
        assert!(!guiboot_enabled("noguiboot"));

        let config = DriverParameters::default().boot_text_config("/NOGUIBOOT");
        assert!(!config.display_enabled());
    }
}
