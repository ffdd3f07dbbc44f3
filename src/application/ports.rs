use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::application::dto::{ChannelEvent, DetectRequest, UploadedFile, ValidationVerdict};
use crate::domain::{
    config::AppConfig,
    detection::DetectionItem,
    errors::DomainResult,
    model::ModelRecord,
    roi::{RoiConfig, RoiConfigMap},
    rules::{RuleConfig, RuleConfigMap},
};

/// Contrato HTTP del servidor de detección (§6 del contrato documentado).
#[async_trait]
pub trait ApiPort: Send + Sync {
    async fn fetch_config(&self) -> DomainResult<AppConfig>;

    async fn upload_image(
        &self,
        filename: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> DomainResult<UploadedFile>;

    async fn list_models(&self) -> DomainResult<Vec<ModelRecord>>;
    async fn add_model(&self, model: &ModelRecord) -> DomainResult<()>;
    async fn delete_model(&self, name: &str) -> DomainResult<()>;
    /// Devuelve el mensaje de confirmación del servidor.
    async fn set_current_model(&self, name: &str) -> DomainResult<String>;

    async fn fetch_rule_configs(&self) -> DomainResult<RuleConfigMap>;
    async fn save_rule_config(&self, name: &str, config: &RuleConfig) -> DomainResult<String>;
    async fn delete_rule_config(&self, name: &str) -> DomainResult<String>;
    async fn validate_detection(
        &self,
        rule_name: &str,
        results: &[DetectionItem],
    ) -> DomainResult<ValidationVerdict>;

    async fn fetch_roi_configs(&self) -> DomainResult<RoiConfigMap>;
    async fn fetch_roi_config(&self, name: &str) -> DomainResult<RoiConfig>;
    /// El mapa completo se guarda de una pieza, igual que lo sirve el servidor.
    async fn save_roi_configs(&self, configs: &RoiConfigMap) -> DomainResult<()>;
    async fn delete_roi_config(&self, name: &str) -> DomainResult<()>;
    /// Devuelve la URL pública de la imagen de fondo procesada.
    async fn upload_roi_background(
        &self,
        filename: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> DomainResult<String>;

    /// Descarga una imagen estática del servidor (previsualizaciones y resultados).
    async fn fetch_image(&self, path: &str) -> DomainResult<Vec<u8>>;
}

/// Canal bidireccional de detección. El cliente emite `detect`; el servidor
/// empuja resultados y errores de forma asíncrona.
#[async_trait]
pub trait DetectionChannelPort: Send + Sync {
    /// Idempotente: si el canal ya está abierto no reconecta.
    async fn connect(&self) -> DomainResult<()>;
    /// Receptor de difusión con los eventos del canal.
    async fn subscribe(&self) -> DomainResult<broadcast::Receiver<ChannelEvent>>;
    fn is_connected(&self) -> bool;
    async fn emit_detect(&self, request: &DetectRequest) -> DomainResult<()>;
}

/// Cámara local. Operaciones bloqueantes; se invocan vía `spawn_blocking`.
pub trait CameraPort: Send {
    fn start(&mut self) -> DomainResult<()>;
    fn stop(&mut self);
    fn is_active(&self) -> bool;
    /// Captura el frame actual y lo devuelve codificado como JPEG.
    fn grab_jpeg(&mut self) -> DomainResult<Vec<u8>>;
}
