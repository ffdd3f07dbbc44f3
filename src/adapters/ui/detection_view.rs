use egui::TextureHandle;

use crate::application::services::SourceKind;
use crate::domain::errors::DomainError;

use super::app::{ConfirmAction, UiCtx};
use super::notifications::NotifyLevel;
use super::state::{result_rows, DashboardState, Services, UiEvent};

/// Página principal: origen de imagen, disparo de la detección y resultados.
pub struct DetectionView {
    pub preview_texture: Option<TextureHandle>,
    pub result_texture: Option<TextureHandle>,
}

impl DetectionView {
    pub fn new() -> Self {
        Self {
            preview_texture: None,
            result_texture: None,
        }
    }

    pub fn show(
        &mut self,
        ui: &mut egui::Ui,
        state: &mut DashboardState,
        services: &Services,
        uic: &UiCtx,
    ) -> Option<ConfirmAction> {
        egui::SidePanel::left("panel_fuente")
            .default_width(260.0)
            .show_inside(ui, |ui| {
                self.show_source_panel(ui, state, services, uic);
            });

        egui::SidePanel::right("panel_resultados")
            .default_width(300.0)
            .show_inside(ui, |ui| {
                self.show_results_panel(ui, state);
            });

        egui::CentralPanel::default().show_inside(ui, |ui| {
            self.show_image_panel(ui, state);
        });

        None
    }

    fn show_source_panel(
        &mut self,
        ui: &mut egui::Ui,
        state: &mut DashboardState,
        services: &Services,
        uic: &UiCtx,
    ) {
        ui.heading("Origen de imagen");
        ui.add_space(4.0);

        let previous = services.images.selected_source();
        let mut kind = previous;
        ui.radio_value(&mut kind, SourceKind::Upload, "Subir imagen");
        ui.radio_value(&mut kind, SourceKind::Webcam, "Cámara");
        if kind != previous {
            services.images.select_source(kind);
            let images = services.images.clone();
            match kind {
                // Al volver a subida se libera la cámara.
                SourceKind::Upload => uic.spawn(async move {
                    images.stop_camera().await;
                    UiEvent::CameraStopped
                }),
                SourceKind::Webcam => uic.spawn(async move {
                    UiEvent::CameraStarted(images.start_camera().await)
                }),
            }
        }

        ui.add_space(8.0);
        match kind {
            SourceKind::Upload => self.show_upload_section(ui, state, services, uic),
            SourceKind::Webcam => self.show_webcam_section(ui, state, services, uic),
        }

        ui.separator();
        ui.label("Regla lógica");
        let selected_text = state
            .selected_rule
            .clone()
            .unwrap_or_else(|| "Sin regla".to_string());
        let mut picked: Option<Option<String>> = None;
        egui::ComboBox::from_id_salt("regla_activa")
            .width(200.0)
            .selected_text(selected_text)
            .show_ui(ui, |ui| {
                if ui
                    .selectable_label(state.selected_rule.is_none(), "Sin regla")
                    .clicked()
                {
                    picked = Some(None);
                }
                for name in state.rule_configs.keys() {
                    let current = state.selected_rule.as_deref() == Some(name.as_str());
                    if ui.selectable_label(current, name).clicked() {
                        picked = Some(Some(name.clone()));
                    }
                }
            });
        if let Some(selection) = picked {
            // Elegir una configuración que referencia otro modelo cambia el
            // modelo activo; es efecto de la selección, no del guardado.
            if let Some(target) = state.select_rule_config(selection) {
                state.busy.switching_model = true;
                let models = services.models.clone();
                uic.spawn(async move {
                    let result = models.use_model(&target).await;
                    UiEvent::ModelSwitched {
                        name: target,
                        result,
                    }
                });
            }
        }

        ui.add_space(12.0);
        ui.horizontal(|ui| {
            let detect = ui.add_enabled(
                !state.busy.detecting,
                egui::Button::new("Detectar objetos"),
            );
            if state.busy.detecting {
                ui.spinner();
            }
            if detect.clicked() {
                state.busy.detecting = true;
                state.status = Some((NotifyLevel::Info, "Ejecutando detección...".to_string()));
                let detection = services.detection.clone();
                let images = services.images.clone();
                let rule = state.selected_rule.clone();
                uic.spawn(async move {
                    let path = images.current_image_path();
                    UiEvent::DetectFinished(
                        detection.detect(path.as_deref(), rule.as_deref()).await,
                    )
                });
            }
        });
    }

    fn show_upload_section(
        &mut self,
        ui: &mut egui::Ui,
        state: &mut DashboardState,
        services: &Services,
        uic: &UiCtx,
    ) {
        ui.horizontal(|ui| {
            let button = ui.add_enabled(
                !state.busy.uploading,
                egui::Button::new("Elegir imagen…"),
            );
            if state.busy.uploading {
                ui.spinner();
            }
            if !button.clicked() {
                return;
            }
            let Some(path) = rfd::FileDialog::new()
                .add_filter("Imágenes", &["jpg", "jpeg", "png"])
                .pick_file()
            else {
                return;
            };

            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

            // Tipo y tamaño se comprueban aquí, antes de leer nada.
            if let Err(err) = services.images.validate_upload(&filename, size) {
                state.notify(NotifyLevel::Warning, err.to_string());
                return;
            }

            state.busy.uploading = true;
            state.status = Some((NotifyLevel::Info, "Subiendo imagen...".to_string()));
            let images = services.images.clone();
            uic.spawn(async move {
                let result = match tokio::fs::read(&path).await {
                    Ok(bytes) => images.upload(SourceKind::Upload, &filename, bytes).await,
                    Err(e) => Err(DomainError::OperationFailed(format!(
                        "No se pudo leer el fichero: {e}"
                    ))),
                };
                UiEvent::Uploaded {
                    kind: SourceKind::Upload,
                    result,
                }
            });
        });
    }

    fn show_webcam_section(
        &mut self,
        ui: &mut egui::Ui,
        state: &mut DashboardState,
        services: &Services,
        uic: &UiCtx,
    ) {
        let active = services.images.camera_active();
        ui.horizontal(|ui| {
            let toggle_label = if active { "Detener" } else { "Iniciar" };
            if ui.button(toggle_label).clicked() {
                let images = services.images.clone();
                if active {
                    uic.spawn(async move {
                        images.stop_camera().await;
                        UiEvent::CameraStopped
                    });
                } else {
                    uic.spawn(async move {
                        UiEvent::CameraStarted(images.start_camera().await)
                    });
                }
            }

            let capture = ui.add_enabled(
                active && !state.busy.capturing,
                egui::Button::new("Capturar"),
            );
            if state.busy.capturing {
                ui.spinner();
            }
            if capture.clicked() {
                state.busy.capturing = true;
                state.status =
                    Some((NotifyLevel::Info, "Procesando la captura...".to_string()));
                let images = services.images.clone();
                uic.spawn(async move {
                    UiEvent::Uploaded {
                        kind: SourceKind::Webcam,
                        result: images.capture_frame().await,
                    }
                });
            }
        });
        if !active {
            ui.label("La cámara está apagada");
        }
    }

    fn show_results_panel(&mut self, ui: &mut egui::Ui, state: &DashboardState) {
        ui.heading("Resultados");
        ui.label(format!("{} objetos encontrados", state.results.len()));
        ui.separator();

        if let Some(verdict) = &state.validation {
            let (bg, label) = if verdict.passed {
                (egui::Color32::from_rgb(40, 167, 69), "Validación superada")
            } else {
                (egui::Color32::from_rgb(220, 53, 69), "Validación fallida")
            };
            egui::Frame::none()
                .fill(bg)
                .rounding(6.0)
                .inner_margin(8.0)
                .show(ui, |ui| {
                    ui.colored_label(egui::Color32::WHITE, label);
                    if !verdict.message.is_empty() {
                        ui.colored_label(egui::Color32::WHITE, &verdict.message);
                    }
                });
            ui.add_space(8.0);
        }

        egui::ScrollArea::vertical().show(ui, |ui| {
            if let Some(rule) = &state.applied_rule {
                ui.label(egui::RichText::new(format!("Usando regla: {rule}")).strong());
                ui.separator();
            }
            if state.results.is_empty() {
                ui.label("No se ha detectado ningún objeto");
                return;
            }
            for row in result_rows(&state.results) {
                ui.horizontal(|ui| {
                    ui.label(&row.label);
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        egui::Frame::none()
                            .fill(egui::Color32::from_rgb(0, 123, 255))
                            .rounding(10.0)
                            .inner_margin(egui::Margin::symmetric(8.0, 2.0))
                            .show(ui, |ui| {
                                ui.colored_label(egui::Color32::WHITE, &row.badge);
                            });
                    });
                });
            }
        });
    }

    fn show_image_panel(&mut self, ui: &mut egui::Ui, state: &DashboardState) {
        if let Some((level, text)) = &state.status {
            let color = match level {
                NotifyLevel::Success => egui::Color32::from_rgb(40, 167, 69),
                NotifyLevel::Warning => egui::Color32::from_rgb(255, 193, 7),
                NotifyLevel::Danger => egui::Color32::from_rgb(220, 53, 69),
                NotifyLevel::Info => egui::Color32::from_rgb(13, 110, 253),
            };
            ui.colored_label(color, text);
            ui.separator();
        }

        // La imagen de resultados tiene prioridad sobre la previsualización.
        let texture = self.result_texture.as_ref().or(self.preview_texture.as_ref());
        if let Some(texture) = texture {
            let available = ui.available_size();
            let tex_size = texture.size();
            let aspect = tex_size[0] as f32 / tex_size[1] as f32;
            let panel_aspect = available.x / available.y.max(1.0);
            let size = if aspect > panel_aspect {
                egui::vec2(available.x, available.x / aspect)
            } else {
                egui::vec2(available.y * aspect, available.y)
            };
            ui.centered_and_justified(|ui| {
                ui.image((texture.id(), size));
            });
        } else {
            ui.centered_and_justified(|ui| {
                ui.label("Sube o captura una imagen para empezar");
            });
        }
    }
}

impl Default for DetectionView {
    fn default() -> Self {
        Self::new()
    }
}
