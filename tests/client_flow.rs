//! Flujos completos del cliente sobre puertos de mentira: subida de imagen,
//! detección con push de resultados y viaje de ida y vuelta de los ROIs por
//! el formato de hilo real.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use yolo_dashboard_client::adapters::ui::state::{result_rows, DashboardState, UiEvent};
use yolo_dashboard_client::application::dto::{
    ChannelEvent, DetectRequest, ServerPush, UploadedFile, ValidationVerdict,
};
use yolo_dashboard_client::application::ports::{ApiPort, CameraPort, DetectionChannelPort};
use yolo_dashboard_client::application::services::{
    DetectionService, ImageSourceService, LogicService, RoiService, SourceKind,
};
use yolo_dashboard_client::domain::config::AppConfig;
use yolo_dashboard_client::domain::detection::DetectionItem;
use yolo_dashboard_client::domain::errors::{DomainError, DomainResult};
use yolo_dashboard_client::domain::model::ModelRecord;
use yolo_dashboard_client::domain::roi::{Roi, RoiConfig, RoiConfigMap};
use yolo_dashboard_client::domain::rules::{CmpOperator, LogicRule, RuleConfig, RuleConfigMap};

/// ApiPort de prueba: registra llamadas y guarda los ROI configs como JSON,
/// igual que viajarían por el hilo.
#[derive(Default)]
struct WireApi {
    calls: Mutex<Vec<String>>,
    roi_json: Mutex<Option<String>>,
}

impl WireApi {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl ApiPort for WireApi {
    async fn fetch_config(&self) -> DomainResult<AppConfig> {
        self.record("fetch_config");
        Ok(AppConfig::default())
    }

    async fn upload_image(
        &self,
        filename: &str,
        mime: &str,
        _bytes: Vec<u8>,
    ) -> DomainResult<UploadedFile> {
        self.record(format!("upload_image:{filename}:{mime}"));
        Ok(UploadedFile {
            filepath: format!("/uploads/{filename}"),
            filename: filename.to_string(),
        })
    }

    async fn list_models(&self) -> DomainResult<Vec<ModelRecord>> {
        self.record("list_models");
        Ok(Vec::new())
    }

    async fn add_model(&self, model: &ModelRecord) -> DomainResult<()> {
        self.record(format!("add_model:{}", model.name));
        Ok(())
    }

    async fn delete_model(&self, name: &str) -> DomainResult<()> {
        self.record(format!("delete_model:{name}"));
        Ok(())
    }

    async fn set_current_model(&self, name: &str) -> DomainResult<String> {
        self.record(format!("set_current_model:{name}"));
        Ok(String::new())
    }

    async fn fetch_rule_configs(&self) -> DomainResult<RuleConfigMap> {
        self.record("fetch_rule_configs");
        Ok(RuleConfigMap::new())
    }

    async fn save_rule_config(&self, name: &str, _config: &RuleConfig) -> DomainResult<String> {
        self.record(format!("save_rule_config:{name}"));
        Ok(format!("Configuración '{name}' guardada"))
    }

    async fn delete_rule_config(&self, name: &str) -> DomainResult<String> {
        self.record(format!("delete_rule_config:{name}"));
        Ok(String::new())
    }

    async fn validate_detection(
        &self,
        rule_name: &str,
        _results: &[DetectionItem],
    ) -> DomainResult<ValidationVerdict> {
        self.record(format!("validate_detection:{rule_name}"));
        Ok(ValidationVerdict {
            passed: true,
            message: String::new(),
        })
    }

    async fn fetch_roi_configs(&self) -> DomainResult<RoiConfigMap> {
        self.record("fetch_roi_configs");
        let json = self.roi_json.lock().unwrap().clone();
        match json {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| DomainError::OperationFailed(e.to_string())),
            None => Ok(RoiConfigMap::new()),
        }
    }

    async fn fetch_roi_config(&self, name: &str) -> DomainResult<RoiConfig> {
        self.record(format!("fetch_roi_config:{name}"));
        let configs = self.fetch_roi_configs().await?;
        configs
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(name.to_string()))
    }

    async fn save_roi_configs(&self, configs: &RoiConfigMap) -> DomainResult<()> {
        self.record("save_roi_configs");
        let json = serde_json::to_string(configs)
            .map_err(|e| DomainError::OperationFailed(e.to_string()))?;
        *self.roi_json.lock().unwrap() = Some(json);
        Ok(())
    }

    async fn delete_roi_config(&self, name: &str) -> DomainResult<()> {
        self.record(format!("delete_roi_config:{name}"));
        Ok(())
    }

    async fn upload_roi_background(
        &self,
        filename: &str,
        _mime: &str,
        _bytes: Vec<u8>,
    ) -> DomainResult<String> {
        self.record(format!("upload_roi_background:{filename}"));
        Ok(format!("/static/uploads/roi_bg_{filename}"))
    }

    async fn fetch_image(&self, path: &str) -> DomainResult<Vec<u8>> {
        self.record(format!("fetch_image:{path}"));
        Ok(Vec::new())
    }
}

/// Canal de prueba controlable desde el test.
#[derive(Default)]
struct TestChannel {
    connected: std::sync::atomic::AtomicBool,
    emitted: Mutex<Vec<DetectRequest>>,
}

#[async_trait]
impl DetectionChannelPort for TestChannel {
    async fn connect(&self) -> DomainResult<()> {
        self.connected
            .store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self) -> DomainResult<broadcast::Receiver<ChannelEvent>> {
        let (tx, rx) = broadcast::channel(8);
        drop(tx);
        Ok(rx)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::SeqCst)
    }

    async fn emit_detect(&self, request: &DetectRequest) -> DomainResult<()> {
        self.emitted.lock().unwrap().push(request.clone());
        Ok(())
    }
}

/// Cámara inerte para los flujos que no capturan.
struct OffCamera;

impl CameraPort for OffCamera {
    fn start(&mut self) -> DomainResult<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn is_active(&self) -> bool {
        false
    }

    fn grab_jpeg(&mut self) -> DomainResult<Vec<u8>> {
        Err(DomainError::InvalidInput(
            "La cámara no está activa".to_string(),
        ))
    }
}

fn person(score: f32) -> DetectionItem {
    DetectionItem {
        class_name: "person".to_string(),
        score,
        class_id: None,
        bbox: None,
        roi_id: None,
    }
}

#[tokio::test]
async fn upload_photo_scenario_updates_preview_and_clears_results() {
    let api = Arc::new(WireApi::default());
    let images = ImageSourceService::new(api.clone(), Box::new(OffCamera));

    // photo.jpg de 2 MiB, tipo admitido: pasa la validación y llega a la red.
    let outcome = images
        .upload(SourceKind::Upload, "photo.jpg", vec![0u8; 2 * 1024 * 1024])
        .await
        .unwrap();
    assert_eq!(outcome.file.filepath, "/uploads/photo.jpg");
    assert_eq!(api.calls(), vec!["upload_image:photo.jpg:image/jpeg"]);

    // El estado adopta la respuesta: previsualización nueva y resultados
    // anteriores fuera.
    let mut state = DashboardState::new();
    state.results = vec![person(0.42)];
    state.result_image = Some("/static/results/viejo.jpg".to_string());
    state.apply(UiEvent::Uploaded {
        kind: SourceKind::Upload,
        result: Ok(outcome),
    });

    assert_eq!(
        state.preview_path.as_deref(),
        Some("/static/uploads/photo.jpg")
    );
    assert!(state.results.is_empty());
    assert_eq!(state.result_image, None);
}

#[tokio::test]
async fn oversized_or_foreign_uploads_never_reach_the_network() {
    let api = Arc::new(WireApi::default());
    let images = ImageSourceService::new(api.clone(), Box::new(OffCamera));

    let err = images
        .upload(SourceKind::Upload, "foto.webp", vec![0u8; 100])
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidInput(_)));

    let err = images
        .upload(
            SourceKind::Upload,
            "grande.jpg",
            vec![0u8; 16 * 1024 * 1024 + 1],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidInput(_)));

    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn detect_emits_once_and_results_push_renders_expected_row() {
    let channel = Arc::new(TestChannel::default());
    let detection = DetectionService::new(channel.clone(), true);

    // Canal arriba y modelo cargado por push autoritativo.
    detection.connect().await.unwrap();
    detection.apply_push(&ServerPush::ModelLoaded {
        model: ModelRecord {
            name: "coco".to_string(),
            kind: "yolov8".to_string(),
            path: "models/coco.onnx".to_string(),
            description: String::new(),
            classes: vec!["person".to_string()],
        },
        message: None,
    });

    detection
        .detect(Some("/uploads/photo.jpg"), None)
        .await
        .unwrap();
    {
        let emitted = channel.emitted.lock().unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].image_path, "/uploads/photo.jpg");
        assert_eq!(emitted[0].rule_name, None);
    }

    // Push posterior de resultados: una fila "1. person" con badge "87.00%".
    let mut state = DashboardState::new();
    state.apply(UiEvent::Channel(ChannelEvent::Push(
        ServerPush::DetectionResults {
            success: true,
            results: vec![person(0.87)],
            result_image: Some("/r.jpg".to_string()),
            rule_name: None,
        },
    )));

    let rows = result_rows(&state.results);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].label, "1. person");
    assert_eq!(rows[0].badge, "87.00%");
    assert_eq!(state.result_image.as_deref(), Some("/r.jpg"));
}

#[tokio::test]
async fn roi_configs_round_trip_through_wire_json() {
    let api = Arc::new(WireApi::default());
    let rois = RoiService::new(api);

    let mut configs = RoiConfigMap::new();
    configs.insert(
        "entrada".to_string(),
        RoiConfig {
            name: "entrada".to_string(),
            background: Some("/static/uploads/roi_bg_puerta.jpg".to_string()),
            rois: vec![
                Roi::rectangle(12.0, 20.0, 180.0, 140.0, "#007bff"),
                Roi::rectangle(300.0, 50.0, 420.0, 260.0, "#dc3545"),
                Roi::Polygon {
                    points: vec![[10.0, 10.0], [90.0, 25.0], [60.0, 110.0]],
                    color: Some("#28a745".to_string()),
                },
            ],
        },
    );
    configs.insert(
        "almacen".to_string(),
        RoiConfig {
            name: "almacen".to_string(),
            background: None,
            rois: vec![Roi::rectangle(0.0, 0.0, 640.0, 320.0, "#6f42c1")],
        },
    );

    rois.save_all(&configs).await.unwrap();
    let reloaded = rois.fetch_all().await.unwrap();

    // Lista ordenada idéntica: geometría y color intactos.
    assert_eq!(reloaded, configs);
}

#[tokio::test]
async fn rule_config_save_is_checked_locally_field_by_field() {
    let api = Arc::new(WireApi::default());
    let logic = LogicService::new(api.clone());

    let rule = LogicRule {
        roi_id: 0,
        class_name: "person".to_string(),
        operator: CmpOperator::Ge,
        count: 1,
    };

    // Sin reglas, sin ROI config y sin modelo: cada caso se rechaza en
    // local con su motivo, sin llamada alguna.
    let empty = RuleConfig {
        roi_config: "zona".to_string(),
        model: "coco".to_string(),
        rules: Vec::new(),
    };
    assert!(logic.save("puerta", &empty, 3).await.is_err());

    let no_roi = RuleConfig {
        roi_config: String::new(),
        model: "coco".to_string(),
        rules: vec![rule.clone()],
    };
    assert!(logic.save("puerta", &no_roi, 3).await.is_err());

    let no_model = RuleConfig {
        roi_config: "zona".to_string(),
        model: String::new(),
        rules: vec![rule.clone()],
    };
    assert!(logic.save("puerta", &no_model, 3).await.is_err());
    assert!(api.calls().is_empty());

    // Completa: una única llamada de guardado.
    let ok = RuleConfig {
        roi_config: "zona".to_string(),
        model: "coco".to_string(),
        rules: vec![rule],
    };
    let message = logic.save("puerta", &ok, 3).await.unwrap();
    assert!(message.contains("puerta"));
    assert_eq!(api.calls(), vec!["save_rule_config:puerta"]);
}
