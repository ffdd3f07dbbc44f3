use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;

use crate::application::dto::{
    ChannelEvent, DetectRequest, ServerPush, UploadedFile, ValidationVerdict,
};
use crate::application::ports::{ApiPort, CameraPort, DetectionChannelPort};
use crate::domain::{
    config::UploadLimits,
    detection::DetectionItem,
    errors::{DomainError, DomainResult},
    model::ModelRecord,
    roi::{RoiConfig, RoiConfigMap},
    rules::{CmpOperator, LogicRule, RuleConfig, RuleConfigMap},
};

/// Origen de la imagen a detectar. Cada origen recuerda su propia ruta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Upload,
    Webcam,
}

impl SourceKind {
    fn index(self) -> usize {
        match self {
            SourceKind::Upload => 0,
            SourceKind::Webcam => 1,
        }
    }
}

/// Resultado de una subida: el fichero aceptado y si su respuesta sigue
/// siendo la más reciente para ese origen (disciplina de tokens).
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub file: UploadedFile,
    pub applied: bool,
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        _ => None,
    }
}

fn extension_of(filename: &str) -> Option<&str> {
    filename.rsplit_once('.').map(|(_, ext)| ext).filter(|e| !e.is_empty())
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Gestiona el origen de la imagen: subida de ficheros y captura de cámara.
/// Valida tipo y tamaño antes de tocar la red y recuerda la ruta devuelta
/// por el servidor por cada origen.
pub struct ImageSourceService {
    api: Arc<dyn ApiPort>,
    camera: Arc<Mutex<Box<dyn CameraPort>>>,
    limits: Mutex<UploadLimits>,
    selected: Mutex<SourceKind>,
    paths: Mutex<[Option<String>; 2]>,
    // Último token emitido por origen; solo su respuesta se aplica.
    tokens: [AtomicU64; 2],
}

impl ImageSourceService {
    pub fn new(api: Arc<dyn ApiPort>, camera: Box<dyn CameraPort>) -> Self {
        Self {
            api,
            camera: Arc::new(Mutex::new(camera)),
            limits: Mutex::new(UploadLimits::default()),
            selected: Mutex::new(SourceKind::Upload),
            paths: Mutex::new([None, None]),
            tokens: [AtomicU64::new(0), AtomicU64::new(0)],
        }
    }

    /// Adopta los límites que el servidor anuncia en `/config.json`.
    pub fn set_limits(&self, limits: UploadLimits) {
        *self.limits.lock().unwrap() = limits;
    }

    pub fn select_source(&self, kind: SourceKind) {
        *self.selected.lock().unwrap() = kind;
    }

    pub fn selected_source(&self) -> SourceKind {
        *self.selected.lock().unwrap()
    }

    /// Ruta de imagen del origen seleccionado, o `None` si aún no hay imagen.
    pub fn current_image_path(&self) -> Option<String> {
        let kind = self.selected_source();
        self.paths.lock().unwrap()[kind.index()].clone()
    }

    /// Validación local previa a cualquier llamada de red.
    pub fn validate_upload(&self, filename: &str, size: u64) -> DomainResult<()> {
        let limits = self.limits.lock().unwrap().clone();
        let ext = extension_of(filename).ok_or_else(|| {
            DomainError::InvalidInput(format!("El fichero '{filename}' no tiene extensión"))
        })?;
        if !limits.allows_extension(ext) || mime_for_extension(ext).is_none() {
            return Err(DomainError::InvalidInput(format!(
                "Tipo de imagen no soportado: .{ext}; sube JPEG o PNG"
            )));
        }
        if size > limits.max_bytes() {
            return Err(DomainError::InvalidInput(format!(
                "La imagen ocupa {:.1} MiB; el límite es {} MB",
                size as f64 / (1024.0 * 1024.0),
                limits.max_size_mb
            )));
        }
        Ok(())
    }

    fn next_token(&self, kind: SourceKind) -> u64 {
        self.tokens[kind.index()].fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Aplica la respuesta de una subida solo si su token sigue siendo el
    /// último emitido para ese origen.
    fn apply_result(&self, kind: SourceKind, token: u64, filepath: &str) -> bool {
        if self.tokens[kind.index()].load(Ordering::SeqCst) != token {
            info!("Respuesta de subida obsoleta descartada (token {token})");
            return false;
        }
        self.paths.lock().unwrap()[kind.index()] = Some(filepath.to_string());
        true
    }

    pub async fn upload(
        &self,
        kind: SourceKind,
        filename: &str,
        bytes: Vec<u8>,
    ) -> DomainResult<UploadOutcome> {
        self.validate_upload(filename, bytes.len() as u64)?;
        let ext = extension_of(filename).unwrap_or("jpg");
        let mime = mime_for_extension(ext).unwrap_or("image/jpeg");
        let token = self.next_token(kind);
        let file = self.api.upload_image(filename, mime, bytes).await?;
        let applied = self.apply_result(kind, token, &file.filepath);
        Ok(UploadOutcome { file, applied })
    }

    pub async fn start_camera(&self) -> DomainResult<()> {
        let camera = self.camera.clone();
        tokio::task::spawn_blocking(move || camera.lock().unwrap().start())
            .await
            .map_err(|e| DomainError::OperationFailed(e.to_string()))?
    }

    pub async fn stop_camera(&self) {
        let camera = self.camera.clone();
        let _ = tokio::task::spawn_blocking(move || camera.lock().unwrap().stop()).await;
    }

    pub fn camera_active(&self) -> bool {
        self.camera.lock().unwrap().is_active()
    }

    /// Captura el frame actual, lo codifica a JPEG y lo sube igual que un
    /// fichero. Requiere la cámara activa.
    pub async fn capture_frame(&self) -> DomainResult<UploadOutcome> {
        let camera = self.camera.clone();
        let jpeg = tokio::task::spawn_blocking(move || camera.lock().unwrap().grab_jpeg())
            .await
            .map_err(|e| DomainError::OperationFailed(e.to_string()))??;
        let filename = format!("webcam_{}.jpg", unix_millis());
        self.upload(SourceKind::Webcam, &filename, jpeg).await
    }
}

/// Motivos por los que `detect` se rechaza sin emitir nada por el canal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DetectError {
    #[error("El canal de detección no está conectado")]
    ChannelDown,
    #[error("No hay ningún modelo cargado")]
    ModelNotLoaded,
    #[error("No hay ninguna imagen para detectar")]
    MissingImage,
    #[error("{0}")]
    Transport(String),
}

/// Orquesta las peticiones de detección sobre el canal persistente.
/// La bandera de modelo cargado solo cambia con un push autoritativo del
/// servidor, nunca de forma optimista.
pub struct DetectionService {
    channel: Arc<dyn DetectionChannelPort>,
    model_loaded: AtomicBool,
    current_model: Mutex<Option<ModelRecord>>,
    // Variante canónica con rule_name; `false` reproduce el emit antiguo.
    rule_aware: bool,
}

impl DetectionService {
    pub fn new(channel: Arc<dyn DetectionChannelPort>, rule_aware: bool) -> Self {
        Self {
            channel,
            model_loaded: AtomicBool::new(false),
            current_model: Mutex::new(None),
            rule_aware,
        }
    }

    /// Abre el canal (idempotente) y devuelve una suscripción a sus eventos.
    pub async fn connect(&self) -> DomainResult<broadcast::Receiver<ChannelEvent>> {
        self.channel.connect().await?;
        self.channel.subscribe().await
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model_loaded.load(Ordering::SeqCst)
    }

    pub fn current_model(&self) -> Option<ModelRecord> {
        self.current_model.lock().unwrap().clone()
    }

    /// Actualiza el estado a partir de un push del servidor. Es el único
    /// camino que marca el modelo como cargado.
    pub fn apply_push(&self, push: &ServerPush) {
        if let ServerPush::ModelLoaded { model, .. } = push {
            self.model_loaded.store(true, Ordering::SeqCst);
            *self.current_model.lock().unwrap() = Some(model.clone());
            info!("Modelo cargado según el servidor: {}", model.name);
        }
    }

    /// Emite una petición de detección. Falla rápido, sin tráfico, si el
    /// canal está caído, no hay modelo o falta la imagen; cada caso con su
    /// propio motivo.
    pub async fn detect(
        &self,
        image_path: Option<&str>,
        rule_name: Option<&str>,
    ) -> Result<(), DetectError> {
        if !self.channel.is_connected() {
            return Err(DetectError::ChannelDown);
        }
        if !self.is_model_loaded() {
            return Err(DetectError::ModelNotLoaded);
        }
        let image_path = image_path
            .filter(|p| !p.is_empty())
            .ok_or(DetectError::MissingImage)?;

        let request = DetectRequest {
            image_path: image_path.to_string(),
            rule_name: if self.rule_aware {
                rule_name.filter(|r| !r.is_empty()).map(str::to_string)
            } else {
                None
            },
        };
        self.channel
            .emit_detect(&request)
            .await
            .map_err(|e| DetectError::Transport(e.to_string()))
    }
}

/// CRUD del catálogo de modelos del servidor.
#[derive(Clone)]
pub struct ModelService {
    api: Arc<dyn ApiPort>,
}

impl ModelService {
    pub fn new(api: Arc<dyn ApiPort>) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> DomainResult<Vec<ModelRecord>> {
        self.api.list_models().await
    }

    pub async fn add(&self, model: &ModelRecord) -> DomainResult<()> {
        if model.name.trim().is_empty() || model.path.trim().is_empty() {
            return Err(DomainError::InvalidInput(
                "El nombre y la ruta del modelo son obligatorios".to_string(),
            ));
        }
        self.api.add_model(model).await
    }

    pub async fn delete(&self, name: &str) -> DomainResult<()> {
        self.api.delete_model(name).await
    }

    /// Selecciona el modelo activo; el refresco de pantallas dependientes
    /// espera a la confirmación del servidor.
    pub async fn use_model(&self, name: &str) -> DomainResult<String> {
        self.api.set_current_model(name).await
    }
}

/// Configuraciones de ROIs: lectura y guardado del mapa completo.
#[derive(Clone)]
pub struct RoiService {
    api: Arc<dyn ApiPort>,
}

impl RoiService {
    pub fn new(api: Arc<dyn ApiPort>) -> Self {
        Self { api }
    }

    pub async fn fetch_all(&self) -> DomainResult<RoiConfigMap> {
        self.api.fetch_roi_configs().await
    }

    pub async fn fetch_one(&self, name: &str) -> DomainResult<RoiConfig> {
        self.api.fetch_roi_config(name).await
    }

    pub async fn save_all(&self, configs: &RoiConfigMap) -> DomainResult<()> {
        self.api.save_roi_configs(configs).await
    }

    pub async fn delete(&self, name: &str) -> DomainResult<()> {
        self.api.delete_roi_config(name).await
    }

    pub async fn upload_background(
        &self,
        filename: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> DomainResult<String> {
        self.api.upload_roi_background(filename, mime, bytes).await
    }
}

/// Motivos locales por los que una regla individual no es válida.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleFormError {
    #[error("Selecciona un ROI")]
    MissingRoi,
    #[error("Selecciona una clase objetivo")]
    MissingClass,
    #[error("Introduce una cantidad entera no negativa")]
    InvalidCount,
    #[error("El ROI {0} no existe en la configuración elegida")]
    RoiOutOfRange(usize),
}

/// Motivos locales por los que una configuración de reglas no se puede guardar.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleSaveError {
    #[error("El nombre de la configuración no puede estar vacío")]
    EmptyName,
    #[error("Selecciona una configuración de ROIs")]
    MissingRoiConfig,
    #[error("Selecciona un modelo de detección")]
    MissingModel,
    #[error("Añade al menos una regla")]
    NoRules,
    #[error("Hay reglas que apuntan a ROIs inexistentes: {0}")]
    StaleRules(String),
}

/// Construye una regla a partir del formulario, con un motivo concreto por
/// cada campo ausente o inválido. Los ROIs se referencian por índice, así
/// que un índice fuera de rango se rechaza en lugar de renumerarse.
pub fn build_rule(
    roi_index: Option<usize>,
    roi_count: usize,
    class_name: Option<&str>,
    operator: CmpOperator,
    count_input: &str,
) -> Result<LogicRule, RuleFormError> {
    let roi_id = roi_index.ok_or(RuleFormError::MissingRoi)?;
    let class_name = class_name
        .filter(|c| !c.is_empty())
        .ok_or(RuleFormError::MissingClass)?;
    let count: u32 = count_input
        .trim()
        .parse()
        .map_err(|_| RuleFormError::InvalidCount)?;
    if roi_id >= roi_count {
        return Err(RuleFormError::RoiOutOfRange(roi_id + 1));
    }
    Ok(LogicRule {
        roi_id,
        class_name: class_name.to_string(),
        operator,
        count,
    })
}

/// Comprueba, campo a campo, que la configuración se puede guardar.
pub fn validate_rule_config(
    name: &str,
    roi_config: Option<&str>,
    model: Option<&str>,
    rules: &[LogicRule],
    roi_count: usize,
) -> Result<(), RuleSaveError> {
    if name.trim().is_empty() {
        return Err(RuleSaveError::EmptyName);
    }
    if roi_config.map_or(true, |c| c.is_empty()) {
        return Err(RuleSaveError::MissingRoiConfig);
    }
    if model.map_or(true, |m| m.is_empty()) {
        return Err(RuleSaveError::MissingModel);
    }
    if rules.is_empty() {
        return Err(RuleSaveError::NoRules);
    }
    let stale: Vec<String> = rules
        .iter()
        .filter(|r| r.roi_id >= roi_count)
        .map(|r| r.describe())
        .collect();
    if !stale.is_empty() {
        return Err(RuleSaveError::StaleRules(stale.join("; ")));
    }
    Ok(())
}

/// Reglas lógicas: validación local estricta y persistencia en el servidor.
#[derive(Clone)]
pub struct LogicService {
    api: Arc<dyn ApiPort>,
}

impl LogicService {
    pub fn new(api: Arc<dyn ApiPort>) -> Self {
        Self { api }
    }

    pub async fn fetch_all(&self) -> DomainResult<RuleConfigMap> {
        self.api.fetch_rule_configs().await
    }

    /// Valida localmente y, solo si pasa, envía la configuración al servidor.
    pub async fn save(
        &self,
        name: &str,
        config: &RuleConfig,
        roi_count: usize,
    ) -> DomainResult<String> {
        validate_rule_config(
            name,
            Some(config.roi_config.as_str()).filter(|c| !c.is_empty()),
            Some(config.model.as_str()).filter(|m| !m.is_empty()),
            &config.rules,
            roi_count,
        )
        .map_err(|e| DomainError::InvalidInput(e.to_string()))?;
        self.api.save_rule_config(name, config).await
    }

    pub async fn delete(&self, name: &str) -> DomainResult<String> {
        self.api.delete_rule_config(name).await
    }

    pub async fn validate_detection(
        &self,
        rule_name: &str,
        results: &[DetectionItem],
    ) -> DomainResult<ValidationVerdict> {
        self.api.validate_detection(rule_name, results).await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn model(name: &str) -> ModelRecord {
        ModelRecord {
            name: name.to_string(),
            kind: "yolov8".to_string(),
            path: format!("models/{name}.onnx"),
            description: String::new(),
            classes: vec!["person".to_string(), "car".to_string()],
        }
    }

    #[tokio::test]
    async fn upload_rejects_foreign_types_before_any_network_call() {
        let api = Arc::new(MockApi::default());
        let svc = image_service(api.clone());

        for filename in ["a.gif", "b.bmp", "c.webp", "d.txt", "e.pdf", "f"] {
            let result = svc.upload(SourceKind::Upload, filename, vec![0u8; 10]).await;
            assert!(
                matches!(result, Err(DomainError::InvalidInput(_))),
                "{filename} debería rechazarse localmente"
            );
        }
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn upload_rejects_oversize_before_any_network_call() {
        let api = Arc::new(MockApi::default());
        let svc = image_service(api.clone());

        let too_big = 16 * 1024 * 1024 + 1;
        let result = svc.validate_upload("big.jpg", too_big);
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));

        let err = svc
            .upload(SourceKind::Upload, "big.jpg", vec![0u8; too_big as usize])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn upload_accepts_jpeg_and_stores_path_per_source() {
        let api = Arc::new(MockApi::default());
        let svc = image_service(api.clone());

        let outcome = svc
            .upload(SourceKind::Upload, "photo.jpg", vec![0u8; 2 * 1024 * 1024])
            .await
            .unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.file.filename, "photo.jpg");

        svc.select_source(SourceKind::Upload);
        assert_eq!(
            svc.current_image_path().as_deref(),
            Some("/static/uploads/photo.jpg")
        );
        svc.select_source(SourceKind::Webcam);
        assert_eq!(svc.current_image_path(), None);
    }

    #[tokio::test]
    async fn stale_upload_response_is_not_applied() {
        let api = Arc::new(MockApi::default());
        let svc = image_service(api);

        let first = svc.next_token(SourceKind::Upload);
        let second = svc.next_token(SourceKind::Upload);
        assert!(second > first);

        // La respuesta del primer token llega tarde: se descarta.
        assert!(!svc.apply_result(SourceKind::Upload, first, "/static/uploads/old.jpg"));
        assert!(svc.apply_result(SourceKind::Upload, second, "/static/uploads/new.jpg"));

        svc.select_source(SourceKind::Upload);
        assert_eq!(
            svc.current_image_path().as_deref(),
            Some("/static/uploads/new.jpg")
        );
    }

    #[tokio::test]
    async fn detect_fails_fast_with_distinct_reasons_and_no_emission() {
        let channel = Arc::new(MockChannel::default());
        let svc = DetectionService::new(channel.clone(), true);

        // Canal caído.
        let err = svc.detect(Some("/uploads/a.jpg"), None).await.unwrap_err();
        assert_eq!(err, DetectError::ChannelDown);

        // Canal arriba pero sin modelo.
        channel.connected.store(true, Ordering::SeqCst);
        let err = svc.detect(Some("/uploads/a.jpg"), None).await.unwrap_err();
        assert_eq!(err, DetectError::ModelNotLoaded);

        // Modelo cargado pero sin imagen.
        svc.apply_push(&ServerPush::ModelLoaded {
            model: model("coco"),
            message: None,
        });
        assert_eq!(
            svc.detect(None, None).await.unwrap_err(),
            DetectError::MissingImage
        );
        assert_eq!(
            svc.detect(Some(""), None).await.unwrap_err(),
            DetectError::MissingImage
        );

        assert!(channel.emitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn detect_emits_exactly_one_request_when_preconditions_hold() {
        let channel = Arc::new(MockChannel::default());
        let svc = DetectionService::new(channel.clone(), true);
        channel.connected.store(true, Ordering::SeqCst);
        svc.apply_push(&ServerPush::ModelLoaded {
            model: model("coco"),
            message: Some("cargado".to_string()),
        });

        svc.detect(Some("/uploads/photo.jpg"), Some("puerta"))
            .await
            .unwrap();

        let emitted = channel.emitted.lock().unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].image_path, "/uploads/photo.jpg");
        assert_eq!(emitted[0].rule_name.as_deref(), Some("puerta"));
    }

    #[tokio::test]
    async fn legacy_detect_drops_rule_name() {
        let channel = Arc::new(MockChannel::default());
        let svc = DetectionService::new(channel.clone(), false);
        channel.connected.store(true, Ordering::SeqCst);
        svc.apply_push(&ServerPush::ModelLoaded {
            model: model("coco"),
            message: None,
        });

        svc.detect(Some("/uploads/photo.jpg"), Some("puerta"))
            .await
            .unwrap();
        assert_eq!(channel.emitted.lock().unwrap()[0].rule_name, None);
    }

    #[tokio::test]
    async fn model_loaded_flag_only_moves_on_model_push() {
        let channel = Arc::new(MockChannel::default());
        let svc = DetectionService::new(channel, true);
        assert!(!svc.is_model_loaded());

        svc.apply_push(&ServerPush::DetectionResults {
            success: true,
            results: Vec::new(),
            result_image: None,
            rule_name: None,
        });
        assert!(!svc.is_model_loaded());

        svc.apply_push(&ServerPush::ModelLoaded {
            model: model("qr"),
            message: None,
        });
        assert!(svc.is_model_loaded());
        assert_eq!(svc.current_model().unwrap().name, "qr");
    }

    #[test]
    fn build_rule_reports_each_missing_field() {
        use CmpOperator::Ge;
        assert_eq!(
            build_rule(None, 3, Some("person"), Ge, "1").unwrap_err(),
            RuleFormError::MissingRoi
        );
        assert_eq!(
            build_rule(Some(0), 3, None, Ge, "1").unwrap_err(),
            RuleFormError::MissingClass
        );
        assert_eq!(
            build_rule(Some(0), 3, Some("person"), Ge, "").unwrap_err(),
            RuleFormError::InvalidCount
        );
        assert_eq!(
            build_rule(Some(0), 3, Some("person"), Ge, "-2").unwrap_err(),
            RuleFormError::InvalidCount
        );
        assert_eq!(
            build_rule(Some(5), 3, Some("person"), Ge, "1").unwrap_err(),
            RuleFormError::RoiOutOfRange(6)
        );

        let rule = build_rule(Some(1), 3, Some("person"), Ge, "2").unwrap();
        assert_eq!(rule.roi_id, 1);
        assert_eq!(rule.count, 2);
    }

    #[test]
    fn rule_config_validation_reports_each_missing_piece() {
        let rule = LogicRule {
            roi_id: 0,
            class_name: "person".to_string(),
            operator: CmpOperator::Ge,
            count: 1,
        };

        assert_eq!(
            validate_rule_config("", Some("zona"), Some("coco"), &[rule.clone()], 1).unwrap_err(),
            RuleSaveError::EmptyName
        );
        assert_eq!(
            validate_rule_config("puerta", None, Some("coco"), &[rule.clone()], 1).unwrap_err(),
            RuleSaveError::MissingRoiConfig
        );
        assert_eq!(
            validate_rule_config("puerta", Some("zona"), None, &[rule.clone()], 1).unwrap_err(),
            RuleSaveError::MissingModel
        );
        assert_eq!(
            validate_rule_config("puerta", Some("zona"), Some("coco"), &[], 1).unwrap_err(),
            RuleSaveError::NoRules
        );

        let stale = LogicRule {
            roi_id: 7,
            ..rule.clone()
        };
        assert!(matches!(
            validate_rule_config("puerta", Some("zona"), Some("coco"), &[stale], 1).unwrap_err(),
            RuleSaveError::StaleRules(_)
        ));

        validate_rule_config("puerta", Some("zona"), Some("coco"), &[rule], 1).unwrap();
    }

    #[tokio::test]
    async fn save_rejects_locally_without_calling_server() {
        let api = Arc::new(MockApi::default());
        let svc = LogicService::new(api.clone());
        let config = RuleConfig::default();

        let err = svc.save("puerta", &config, 0).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn roi_configs_round_trip_preserves_order_and_geometry() {
        use crate::domain::roi::{Roi, RoiConfig};

        let api = Arc::new(MockApi::default());
        let svc = RoiService::new(api);

        let mut configs = RoiConfigMap::new();
        configs.insert(
            "entrada".to_string(),
            RoiConfig {
                name: "entrada".to_string(),
                background: Some("/static/uploads/bg.jpg".to_string()),
                rois: vec![
                    Roi::rectangle(10.0, 20.0, 110.0, 80.0, "#007bff"),
                    Roi::rectangle(200.0, 40.0, 320.0, 180.0, "#dc3545"),
                    Roi::Polygon {
                        points: vec![[0.0, 0.0], [50.0, 10.0], [30.0, 60.0]],
                        color: Some("#28a745".to_string()),
                    },
                ],
            },
        );

        svc.save_all(&configs).await.unwrap();
        let reloaded = svc.fetch_all().await.unwrap();
        assert_eq!(reloaded, configs);
    }
}
