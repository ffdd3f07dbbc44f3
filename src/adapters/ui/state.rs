use std::sync::Arc;

use crate::application::dto::{
    ChannelEvent, ServerPush, UploadedFile, ValidationVerdict,
};
use crate::application::ports::ApiPort;
use crate::application::services::{
    DetectError, DetectionService, ImageSourceService, LogicService, ModelService, RoiService,
    SourceKind, UploadOutcome,
};
use crate::domain::{
    config::AppConfig,
    detection::{summarize, DetectionItem},
    errors::DomainError,
    model::ModelRecord,
    roi::{RoiConfig, RoiConfigMap},
    rules::RuleConfigMap,
};

use super::notifications::{Notifications, NotifyLevel};

/// Servicios compartidos por toda la interfaz, al estilo del estado que el
/// servidor inyecta en sus manejadores.
#[derive(Clone)]
pub struct Services {
    pub api: Arc<dyn ApiPort>,
    pub images: Arc<ImageSourceService>,
    pub detection: Arc<DetectionService>,
    pub models: ModelService,
    pub rois: RoiService,
    pub logic: LogicService,
}

/// Destino de una imagen descargada del servidor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    Preview,
    Result,
    RoiBackground,
    RulePreview,
}

impl ImageSlot {
    pub(crate) fn index(self) -> usize {
        match self {
            ImageSlot::Preview => 0,
            ImageSlot::Result => 1,
            ImageSlot::RoiBackground => 2,
            ImageSlot::RulePreview => 3,
        }
    }
}

/// Operaciones en vuelo; cada botón se desactiva mientras su bandera esté
/// puesta y toda ruta de fallo la limpia.
#[derive(Debug, Default)]
pub struct BusyFlags {
    pub uploading: bool,
    pub capturing: bool,
    pub detecting: bool,
    pub switching_model: bool,
    pub saving_model: bool,
    pub deleting_model: bool,
    pub saving_rois: bool,
    pub uploading_background: bool,
    pub saving_rule: bool,
    pub deleting_rule: bool,
    pub validating: bool,
}

/// Tokens monotónicos por tipo de operación de lectura: solo la respuesta
/// del último token emitido se aplica al estado.
#[derive(Debug, Default)]
pub struct RequestTokens {
    pub models: u64,
    pub roi_configs: u64,
    pub rule_configs: u64,
    pub images: [u64; 4],
}

/// Evento tipado que las tareas de fondo mandan al despachador único.
#[derive(Debug)]
pub enum UiEvent {
    ConfigLoaded(Result<AppConfig, DomainError>),
    ChannelReady(Result<(), DomainError>),
    Channel(ChannelEvent),
    Uploaded {
        kind: SourceKind,
        result: Result<UploadOutcome, DomainError>,
    },
    CameraStarted(Result<(), DomainError>),
    CameraStopped,
    DetectFinished(Result<(), DetectError>),
    ModelsLoaded {
        token: u64,
        result: Result<Vec<ModelRecord>, DomainError>,
    },
    ModelAdded(Result<(), DomainError>),
    ModelDeleted {
        name: String,
        result: Result<(), DomainError>,
    },
    ModelSwitched {
        name: String,
        result: Result<String, DomainError>,
    },
    RoiConfigsLoaded {
        token: u64,
        result: Result<RoiConfigMap, DomainError>,
    },
    RoiConfigsSaved(Result<(), DomainError>),
    RoiConfigDeleted {
        name: String,
        result: Result<(), DomainError>,
    },
    BackgroundUploaded(Result<String, DomainError>),
    RuleConfigsLoaded {
        token: u64,
        result: Result<RuleConfigMap, DomainError>,
    },
    RuleRoiDetailLoaded {
        name: String,
        result: Result<RoiConfig, DomainError>,
    },
    RuleSaved {
        name: String,
        result: Result<String, DomainError>,
    },
    RuleDeleted {
        name: String,
        result: Result<String, DomainError>,
    },
    ValidationFinished(Result<ValidationVerdict, DomainError>),
    ImageFetched {
        slot: ImageSlot,
        token: u64,
        result: Result<Vec<u8>, DomainError>,
    },
}

/// Fila ya formateada de la lista de resultados.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub label: String,
    pub badge: String,
}

/// Formatea los resultados como los muestra la lista: numerados desde 1,
/// con el ROI entre paréntesis si existe y la confianza en porcentaje con
/// dos decimales.
pub fn result_rows(items: &[DetectionItem]) -> Vec<ResultRow> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let mut label = format!("{}. {}", i + 1, item.class_name);
            if let Some(roi_id) = item.roi_id {
                label.push_str(&format!(" (ROI {})", roi_id + 1));
            }
            ResultRow {
                label,
                badge: format!("{:.2}%", item.score * 100.0),
            }
        })
        .collect()
}

/// Estado tipado de toda la aplicación. Solo lo muta `apply`, el despachador
/// único; las vistas lo leen y disparan operaciones.
pub struct DashboardState {
    pub config: AppConfig,
    pub connected: bool,
    pub model_loaded: bool,
    pub current_model: Option<ModelRecord>,
    pub models: Vec<ModelRecord>,

    pub results: Vec<DetectionItem>,
    pub result_image: Option<String>,
    pub applied_rule: Option<String>,
    pub preview_path: Option<String>,
    pub status: Option<(NotifyLevel, String)>,

    pub roi_configs: RoiConfigMap,
    pub rule_configs: RuleConfigMap,
    pub selected_rule: Option<String>,
    pub rule_preview: Option<(String, RoiConfig)>,
    pub validation: Option<ValidationVerdict>,

    /// Bytes recién descargados, pendientes de convertirse en textura.
    pub pending_images: Vec<(ImageSlot, Vec<u8>)>,

    pub notifications: Notifications,
    pub busy: BusyFlags,
    pub tokens: RequestTokens,
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            connected: false,
            model_loaded: false,
            current_model: None,
            models: Vec::new(),
            results: Vec::new(),
            result_image: None,
            applied_rule: None,
            preview_path: None,
            status: None,
            roi_configs: RoiConfigMap::new(),
            rule_configs: RuleConfigMap::new(),
            selected_rule: None,
            rule_preview: None,
            validation: None,
            pending_images: Vec::new(),
            notifications: Notifications::new(),
            busy: BusyFlags::default(),
            tokens: RequestTokens::default(),
        }
    }

    pub fn notify(&mut self, level: NotifyLevel, text: impl Into<String>) {
        self.notifications.push(level, text);
    }

    fn notify_error(&mut self, err: &DomainError) {
        let level = match err {
            DomainError::InvalidInput(_) => NotifyLevel::Warning,
            _ => NotifyLevel::Danger,
        };
        self.notify(level, err.to_string());
    }

    fn set_status(&mut self, level: NotifyLevel, text: impl Into<String>) {
        self.status = Some((level, text.into()));
    }

    pub fn begin_models_fetch(&mut self) -> u64 {
        self.tokens.models += 1;
        self.tokens.models
    }

    pub fn begin_roi_configs_fetch(&mut self) -> u64 {
        self.tokens.roi_configs += 1;
        self.tokens.roi_configs
    }

    pub fn begin_rule_configs_fetch(&mut self) -> u64 {
        self.tokens.rule_configs += 1;
        self.tokens.rule_configs
    }

    pub fn begin_image_fetch(&mut self, slot: ImageSlot) -> u64 {
        self.tokens.images[slot.index()] += 1;
        self.tokens.images[slot.index()]
    }

    /// Selecciona (o limpia) la regla activa de la página de detección.
    /// Devuelve el modelo al que hay que cambiar si la configuración elegida
    /// referencia otro distinto: el cambio de modelo es efecto de seleccionar,
    /// nunca de guardar.
    pub fn select_rule_config(&mut self, name: Option<String>) -> Option<String> {
        self.validation = None;
        self.selected_rule = name.clone();
        let name = name?;
        let config = self.rule_configs.get(&name)?;
        let target = config.model.clone();
        let already = self
            .current_model
            .as_ref()
            .map(|m| m.name == target)
            .unwrap_or(false);
        if already {
            None
        } else {
            Some(target)
        }
    }

    /// Despachador único: toda mutación del estado pasa por aquí.
    pub fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::ConfigLoaded(Ok(config)) => {
                self.current_model = config.current_model().cloned();
                self.config = config;
            }
            UiEvent::ConfigLoaded(Err(err)) => {
                // Igual que el front original: sin configuración remota se
                // sigue con los valores por defecto.
                self.config = AppConfig::default();
                self.notify(
                    NotifyLevel::Danger,
                    format!("No se pudo cargar la configuración: {err}"),
                );
            }

            UiEvent::ChannelReady(Ok(())) => {}
            UiEvent::ChannelReady(Err(err)) => {
                self.connected = false;
                self.notify(
                    NotifyLevel::Danger,
                    format!("Sin conexión con el servidor: {err}"),
                );
            }

            UiEvent::Channel(ChannelEvent::Connected) => {
                self.connected = true;
                self.notify(NotifyLevel::Success, "Conectado al servidor");
            }
            UiEvent::Channel(ChannelEvent::Disconnected) => {
                self.connected = false;
                self.busy.detecting = false;
                self.notify(
                    NotifyLevel::Warning,
                    "Conexión con el servidor perdida; reconecta para seguir",
                );
            }
            UiEvent::Channel(ChannelEvent::Push(push)) => self.apply_push(push),

            UiEvent::Uploaded { kind, result } => {
                self.busy.uploading = false;
                self.busy.capturing = false;
                match result {
                    Ok(outcome) if outcome.applied => self.adopt_upload(kind, outcome.file),
                    Ok(_) => {} // respuesta obsoleta: la ignora el token
                    Err(err) => {
                        self.set_status(NotifyLevel::Danger, err.to_string());
                        self.notify_error(&err);
                    }
                }
            }

            UiEvent::CameraStarted(Ok(())) => {
                self.notify(NotifyLevel::Success, "Cámara iniciada");
            }
            UiEvent::CameraStarted(Err(err)) => {
                self.notify(
                    NotifyLevel::Danger,
                    format!("No se pudo acceder a la cámara: {err}"),
                );
            }
            UiEvent::CameraStopped => {
                self.notify(NotifyLevel::Info, "Cámara detenida");
            }

            UiEvent::DetectFinished(Ok(())) => {
                self.set_status(NotifyLevel::Info, "Ejecutando detección...");
            }
            UiEvent::DetectFinished(Err(err)) => {
                self.busy.detecting = false;
                let level = match err {
                    DetectError::Transport(_) => NotifyLevel::Danger,
                    _ => NotifyLevel::Warning,
                };
                self.notify(level, err.to_string());
            }

            UiEvent::ModelsLoaded { token, result } => {
                if token != self.tokens.models {
                    return;
                }
                match result {
                    Ok(models) => self.models = models,
                    Err(err) => self.notify_error(&err),
                }
            }
            UiEvent::ModelAdded(result) => {
                self.busy.saving_model = false;
                match result {
                    Ok(()) => self.notify(NotifyLevel::Success, "Modelo añadido"),
                    Err(err) => self.notify_error(&err),
                }
            }
            UiEvent::ModelDeleted { name, result } => {
                self.busy.deleting_model = false;
                match result {
                    Ok(()) => {
                        self.notify(NotifyLevel::Success, format!("Modelo \"{name}\" eliminado"))
                    }
                    Err(err) => self.notify_error(&err),
                }
            }
            UiEvent::ModelSwitched { name, result } => {
                self.busy.switching_model = false;
                match result {
                    Ok(message) => {
                        let text = if message.is_empty() {
                            format!("Cambiado al modelo \"{name}\"")
                        } else {
                            message
                        };
                        self.notify(NotifyLevel::Success, text);
                    }
                    Err(err) => self.notify_error(&err),
                }
            }

            UiEvent::RoiConfigsLoaded { token, result } => {
                if token != self.tokens.roi_configs {
                    return;
                }
                match result {
                    Ok(configs) => self.roi_configs = configs,
                    Err(err) => self.notify_error(&err),
                }
            }
            UiEvent::RoiConfigsSaved(result) => {
                self.busy.saving_rois = false;
                match result {
                    Ok(()) => self.notify(NotifyLevel::Success, "Configuración de ROIs guardada"),
                    Err(err) => self.notify_error(&err),
                }
            }
            UiEvent::RoiConfigDeleted { name, result } => match result {
                Ok(()) => {
                    self.roi_configs.remove(&name);
                    self.notify(
                        NotifyLevel::Success,
                        format!("Configuración \"{name}\" eliminada"),
                    );
                }
                Err(err) => self.notify_error(&err),
            },
            UiEvent::BackgroundUploaded(result) => {
                self.busy.uploading_background = false;
                match result {
                    Ok(_) => self.notify(NotifyLevel::Success, "Imagen de fondo subida"),
                    Err(err) => self.notify_error(&err),
                }
            }

            UiEvent::RuleConfigsLoaded { token, result } => {
                if token != self.tokens.rule_configs {
                    return;
                }
                match result {
                    Ok(configs) => self.rule_configs = configs,
                    Err(err) => self.notify_error(&err),
                }
            }
            UiEvent::RuleRoiDetailLoaded { name, result } => match result {
                Ok(config) => self.rule_preview = Some((name, config)),
                Err(err) => {
                    self.rule_preview = None;
                    self.notify_error(&err);
                }
            },
            UiEvent::RuleSaved { name, result } => {
                self.busy.saving_rule = false;
                match result {
                    Ok(message) => {
                        let text = if message.is_empty() {
                            format!("Configuración \"{name}\" guardada")
                        } else {
                            message
                        };
                        self.notify(NotifyLevel::Success, text);
                    }
                    Err(err) => self.notify_error(&err),
                }
            }
            UiEvent::RuleDeleted { name, result } => {
                self.busy.deleting_rule = false;
                match result {
                    Ok(message) => {
                        self.rule_configs.remove(&name);
                        if self.selected_rule.as_deref() == Some(name.as_str()) {
                            self.selected_rule = None;
                            self.validation = None;
                        }
                        let text = if message.is_empty() {
                            format!("Configuración \"{name}\" eliminada")
                        } else {
                            message
                        };
                        self.notify(NotifyLevel::Success, text);
                    }
                    Err(err) => self.notify_error(&err),
                }
            }
            UiEvent::ValidationFinished(result) => {
                self.busy.validating = false;
                match result {
                    Ok(verdict) => self.validation = Some(verdict),
                    Err(err) => self.notify_error(&err),
                }
            }

            UiEvent::ImageFetched {
                slot,
                token,
                result,
            } => {
                if token != self.tokens.images[slot.index()] {
                    return;
                }
                match result {
                    Ok(bytes) => self.pending_images.push((slot, bytes)),
                    Err(err) => {
                        tracing::warn!("Descarga de imagen fallida: {err}");
                    }
                }
            }
        }
    }

    fn adopt_upload(&mut self, kind: SourceKind, file: UploadedFile) {
        // La previsualización apunta a la copia pública del servidor y los
        // resultados anteriores dejan de valer.
        self.preview_path = Some(format!("/static/uploads/{}", file.filename));
        self.results.clear();
        self.result_image = None;
        self.applied_rule = None;
        self.validation = None;
        let verb = match kind {
            SourceKind::Upload => "subida",
            SourceKind::Webcam => "capturada",
        };
        self.set_status(
            NotifyLevel::Success,
            format!("Imagen {verb}, lista para detectar"),
        );
        self.notify(NotifyLevel::Success, format!("Imagen {verb} correctamente"));
    }

    fn apply_push(&mut self, push: ServerPush) {
        match push {
            ServerPush::ModelLoaded { model, message } => {
                self.model_loaded = true;
                self.current_model = Some(model);
                let text =
                    message.unwrap_or_else(|| "Modelo cargado; ya se puede detectar".to_string());
                self.notify(NotifyLevel::Success, text);
            }
            ServerPush::DetectionResults {
                success,
                results,
                result_image,
                rule_name,
            } => {
                self.busy.detecting = false;
                if success {
                    let summary = summarize(&results);
                    let detail = if summary.is_empty() {
                        String::new()
                    } else {
                        format!(" ({summary})")
                    };
                    self.set_status(
                        NotifyLevel::Success,
                        format!("Detección completada: {} objetos{detail}", results.len()),
                    );
                    self.results = results;
                    self.result_image = result_image;
                    self.applied_rule = rule_name;
                    self.notify(NotifyLevel::Success, "Detección completada");
                } else {
                    self.set_status(NotifyLevel::Danger, "La detección falló");
                    self.notify(NotifyLevel::Danger, "La detección falló, vuelve a intentarlo");
                }
            }
            ServerPush::DetectionError { error } => {
                self.busy.detecting = false;
                self.set_status(NotifyLevel::Danger, format!("Detección fallida: {error}"));
                self.notify(NotifyLevel::Danger, format!("Error de detección: {error}"));
            }
        }
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}
