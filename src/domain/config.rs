use serde::{Deserialize, Serialize};

use super::model::ModelRecord;
use super::roi::RoiConfigMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Puntero al modelo activo dentro de la configuración del servidor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelPointer {
    #[serde(default)]
    pub current_model: Option<String>,
}

/// Límites de subida que el servidor anuncia en `/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadLimits {
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_max_size_mb() -> u64 {
    16
}

fn default_extensions() -> Vec<String> {
    vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()]
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_size_mb: default_max_size_mb(),
            allowed_extensions: default_extensions(),
        }
    }
}

impl UploadLimits {
    pub fn max_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }

    pub fn allows_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
    }
}

/// Imagen fiel de `/config.json`. Si la descarga falla, `AppConfig::default()`
/// reproduce los valores con los que el front original seguía funcionando.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelPointer,
    #[serde(default)]
    pub models: Vec<ModelRecord>,
    #[serde(default)]
    pub upload: UploadLimits,
    #[serde(default)]
    pub roi_configs: RoiConfigMap,
}

impl AppConfig {
    /// Registro completo del modelo activo, si el puntero resuelve.
    pub fn current_model(&self) -> Option<&ModelRecord> {
        let name = self.model.current_model.as_deref()?;
        self.models.iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_tolerates_missing_sections() {
        let cfg: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.upload.max_size_mb, 16);
        assert_eq!(cfg.upload.allowed_extensions, vec!["jpg", "jpeg", "png"]);
        assert!(cfg.current_model().is_none());
    }

    #[test]
    fn current_model_resolves_pointer() {
        let json = r#"{
            "model": {"current_model": "qr"},
            "models": [
                {"name": "qr", "type": "yolov8", "path": "models/qr.onnx"},
                {"name": "coco", "type": "yolov8", "path": "models/coco.onnx"}
            ]
        }"#;
        let cfg: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.current_model().unwrap().name, "qr");
    }

    #[test]
    fn upload_limits_convert_to_bytes() {
        let limits = UploadLimits::default();
        assert_eq!(limits.max_bytes(), 16 * 1024 * 1024);
        assert!(limits.allows_extension("JPG"));
        assert!(!limits.allows_extension("gif"));
    }
}
