use egui::{Align2, Color32, FontId, Pos2, Rect, Stroke, TextureHandle};

use crate::domain::roi::{Roi, RoiConfig};

use super::app::{ConfirmAction, UiCtx};
use super::editor::{EditorAction, RoiEditor, Tool};
use super::notifications::NotifyLevel;
use super::state::{DashboardState, Services, UiEvent};

/// Lado del lienzo de edición; las imágenes de fondo se sirven ya ajustadas
/// a este tamaño.
pub const CANVAS_SIZE: f32 = 640.0;

/// Convierte un color "#rrggbb" a Color32; azul del tema si no parsea.
pub(crate) fn hex_color(hex: &str) -> Color32 {
    let raw = hex.strip_prefix('#').unwrap_or(hex);
    if raw.len() == 6 {
        if let (Ok(r), Ok(g), Ok(b)) = (
            u8::from_str_radix(&raw[0..2], 16),
            u8::from_str_radix(&raw[2..4], 16),
            u8::from_str_radix(&raw[4..6], 16),
        ) {
            return Color32::from_rgb(r, g, b);
        }
    }
    Color32::from_rgb(0, 123, 255)
}

/// Pinta la lista de ROIs sobre el lienzo, con relleno translúcido, borde
/// más grueso para el seleccionado y etiqueta numerada desde 1.
pub(crate) fn paint_rois(
    painter: &egui::Painter,
    origin: Pos2,
    rois: &[Roi],
    selected: Option<usize>,
) {
    for (i, roi) in rois.iter().enumerate() {
        let color = hex_color(roi.color().unwrap_or("#007bff"));
        let stroke = Stroke::new(if selected == Some(i) { 3.0 } else { 2.0 }, color);

        match roi {
            Roi::Rectangle { .. } => {
                let (x1, y1, x2, y2) = roi.bounds();
                let rect = Rect::from_min_max(
                    origin + egui::vec2(x1, y1),
                    origin + egui::vec2(x2, y2),
                );
                painter.rect_filled(rect, 0.0, color.gamma_multiply(0.2));
                painter.rect_stroke(rect, 0.0, stroke);
            }
            Roi::Polygon { points, .. } => {
                let pts: Vec<Pos2> = points
                    .iter()
                    .map(|p| origin + egui::vec2(p[0], p[1]))
                    .collect();
                painter.add(egui::Shape::closed_line(pts, stroke));
            }
        }

        let (x1, y1, _, _) = roi.bounds();
        let label_pos = origin + egui::vec2(x1 + 3.0, y1 + 2.0);
        painter.text(
            label_pos,
            Align2::LEFT_TOP,
            (i + 1).to_string(),
            FontId::proportional(14.0),
            Color32::WHITE,
        );
    }
}

/// Puntos de control en esquinas y puntos medios del ROI seleccionado.
fn paint_handles(painter: &egui::Painter, origin: Pos2, roi: &Roi) {
    let (x1, y1, x2, y2) = roi.bounds();
    let (cx, cy) = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);
    let handles = [
        (x1, y1),
        (x2, y1),
        (x1, y2),
        (x2, y2),
        (cx, y1),
        (cx, y2),
        (x1, cy),
        (x2, cy),
    ];
    for (hx, hy) in handles {
        painter.circle(
            origin + egui::vec2(hx, hy),
            5.0,
            Color32::WHITE,
            Stroke::new(1.0, Color32::BLACK),
        );
    }
}

/// Editor de configuraciones de ROIs: lienzo, herramientas y persistencia.
pub struct RoiView {
    pub editor: RoiEditor,
    selected_config: Option<String>,
    new_config_name: String,
    pub background_url: Option<String>,
    pub background_texture: Option<TextureHandle>,
}

impl RoiView {
    pub fn new() -> Self {
        Self {
            editor: RoiEditor::new(),
            selected_config: None,
            new_config_name: String::new(),
            background_url: None,
            background_texture: None,
        }
    }

    pub fn selected_config(&self) -> Option<&str> {
        self.selected_config.as_deref()
    }

    /// Carga la configuración elegida en el editor, descartando las
    /// ediciones en curso (la confirmación ya pasó por el diálogo).
    pub fn apply_config_switch(&mut self, name: &str, state: &DashboardState) {
        if let Some(config) = state.roi_configs.get(name) {
            self.selected_config = Some(name.to_string());
            self.background_url = config.background.clone();
            self.editor.load(config.rois.clone());
        }
    }

    pub fn set_background(&mut self, url: String) {
        self.background_url = Some(url);
        self.editor.touch();
    }

    pub fn on_config_deleted(&mut self, name: &str) {
        if self.selected_config.as_deref() == Some(name) {
            self.selected_config = None;
            self.background_url = None;
            self.background_texture = None;
            self.editor.load(Vec::new());
        }
    }

    pub fn show(
        &mut self,
        ui: &mut egui::Ui,
        state: &mut DashboardState,
        services: &Services,
        uic: &UiCtx,
    ) -> Option<ConfirmAction> {
        let mut confirm = None;

        egui::SidePanel::right("panel_lista_rois")
            .default_width(260.0)
            .show_inside(ui, |ui| {
                self.show_roi_list(ui);
            });

        egui::CentralPanel::default().show_inside(ui, |ui| {
            if let Some(action) = self.show_config_bar(ui, state, services, uic) {
                confirm = Some(action);
            }
            ui.separator();
            self.show_toolbar(ui, state, services, uic);
            ui.add_space(6.0);
            egui::ScrollArea::both().show(ui, |ui| {
                self.show_canvas(ui, state);
            });
        });

        confirm
    }

    fn show_config_bar(
        &mut self,
        ui: &mut egui::Ui,
        state: &mut DashboardState,
        services: &Services,
        uic: &UiCtx,
    ) -> Option<ConfirmAction> {
        let mut confirm = None;

        ui.horizontal(|ui| {
            ui.label("Configuración:");
            let selected_text = self
                .selected_config
                .clone()
                .unwrap_or_else(|| "Selecciona una configuración".to_string());
            let mut picked: Option<String> = None;
            egui::ComboBox::from_id_salt("roi_config_activa")
                .width(200.0)
                .selected_text(selected_text)
                .show_ui(ui, |ui| {
                    for name in state.roi_configs.keys() {
                        let current = self.selected_config.as_deref() == Some(name.as_str());
                        if ui.selectable_label(current, name).clicked() {
                            picked = Some(name.clone());
                        }
                    }
                });
            if let Some(name) = picked {
                if self.selected_config.as_deref() != Some(name.as_str()) {
                    if self.editor.is_dirty() {
                        // Hay cambios sin guardar: que lo decida el usuario.
                        confirm = Some(ConfirmAction::SwitchRoiConfig(name));
                    } else {
                        self.apply_config_switch(&name, state);
                    }
                }
            }

            ui.separator();
            ui.add(
                egui::TextEdit::singleline(&mut self.new_config_name)
                    .hint_text("Nombre nuevo")
                    .desired_width(140.0),
            );
            if ui.button("Crear").clicked() {
                let name = self.new_config_name.trim().to_string();
                if name.is_empty() {
                    state.notify(NotifyLevel::Warning, "Escribe un nombre para la configuración");
                } else if state.roi_configs.contains_key(&name) {
                    state.notify(NotifyLevel::Warning, "Ya existe una configuración con ese nombre");
                } else {
                    state.roi_configs.insert(
                        name.clone(),
                        RoiConfig {
                            name: name.clone(),
                            background: None,
                            rois: Vec::new(),
                        },
                    );
                    self.selected_config = Some(name);
                    self.background_url = None;
                    self.editor.load(Vec::new());
                    self.editor.touch(); // nueva y aún sin guardar
                    self.new_config_name.clear();
                }
            }

            if let Some(name) = self.selected_config.clone() {
                if ui.button("Eliminar").clicked() {
                    confirm = Some(ConfirmAction::DeleteRoiConfig(name));
                }
            }
        });

        ui.horizontal(|ui| {
            let upload = ui.add_enabled(
                !state.busy.uploading_background,
                egui::Button::new("Subir fondo…"),
            );
            if state.busy.uploading_background {
                ui.spinner();
            }
            if upload.clicked() {
                if self.selected_config.is_none() {
                    state.notify(
                        NotifyLevel::Warning,
                        "Crea o selecciona una configuración primero",
                    );
                } else if let Some(path) = rfd::FileDialog::new()
                    .add_filter("Imágenes", &["jpg", "jpeg", "png"])
                    .pick_file()
                {
                    let filename = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                    if let Err(err) = services.images.validate_upload(&filename, size) {
                        state.notify(NotifyLevel::Warning, err.to_string());
                    } else {
                        state.busy.uploading_background = true;
                        let rois = services.rois.clone();
                        let mime = if filename.to_ascii_lowercase().ends_with(".png") {
                            "image/png"
                        } else {
                            "image/jpeg"
                        };
                        uic.spawn(async move {
                            let result = match tokio::fs::read(&path).await {
                                Ok(bytes) => {
                                    rois.upload_background(&filename, mime, bytes).await
                                }
                                Err(e) => Err(crate::domain::errors::DomainError::OperationFailed(
                                    format!("No se pudo leer el fichero: {e}"),
                                )),
                            };
                            UiEvent::BackgroundUploaded(result)
                        });
                    }
                }
            }
            ui.label("El fondo se ajusta a 640x640 en el servidor");
        });

        confirm
    }

    fn show_toolbar(
        &mut self,
        ui: &mut egui::Ui,
        state: &mut DashboardState,
        services: &Services,
        uic: &UiCtx,
    ) {
        ui.horizontal(|ui| {
            let rect_active = self.editor.tool() == Tool::Rectangle;
            if ui.selectable_label(rect_active, "▭ Rectángulo").clicked() {
                self.editor.set_tool(Tool::Rectangle);
            }
            let select_active = self.editor.tool() == Tool::Select;
            if ui.selectable_label(select_active, "⇱ Seleccionar").clicked() {
                self.editor.set_tool(Tool::Select);
            }

            ui.separator();

            if self.editor.selected_index().is_some() && ui.button("Borrar ROI").clicked() {
                if let EditorAction::Deleted(index) = self.editor.delete_selected() {
                    state.notify(NotifyLevel::Info, format!("ROI {} eliminado", index + 1));
                }
            }
            if ui.button("Limpiar").clicked() {
                self.editor.clear();
            }

            ui.separator();

            let save = ui.add_enabled(
                !state.busy.saving_rois && self.selected_config.is_some(),
                egui::Button::new("Guardar"),
            );
            if state.busy.saving_rois {
                ui.spinner();
            }
            if save.clicked() {
                if let Some(name) = self.selected_config.clone() {
                    // Se guarda el mapa completo, con la lista del editor
                    // volcada en la configuración activa.
                    if let Some(config) = state.roi_configs.get_mut(&name) {
                        config.rois = self.editor.rois().to_vec();
                        config.background = self.background_url.clone();
                        config.name = name.clone();
                    }
                    state.busy.saving_rois = true;
                    let configs = state.roi_configs.clone();
                    let rois = services.rois.clone();
                    uic.spawn(async move {
                        UiEvent::RoiConfigsSaved(rois.save_all(&configs).await)
                    });
                }
            }

            if self.editor.is_dirty() {
                ui.colored_label(Color32::from_rgb(255, 193, 7), "Cambios sin guardar");
            }
        });
    }

    fn show_canvas(&mut self, ui: &mut egui::Ui, state: &mut DashboardState) {
        let (response, painter) = ui.allocate_painter(
            egui::vec2(CANVAS_SIZE, CANVAS_SIZE),
            egui::Sense::click_and_drag(),
        );
        let origin = response.rect.min;

        painter.rect_filled(response.rect, 0.0, Color32::from_gray(24));
        if let Some(texture) = &self.background_texture {
            painter.image(
                texture.id(),
                response.rect,
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        }

        if self.selected_config.is_none() {
            if response.clicked() || response.drag_started() {
                state.notify(
                    NotifyLevel::Warning,
                    "Crea o selecciona una configuración primero",
                );
            }
        } else {
            let local = |pos: Pos2| (pos.x - origin.x, pos.y - origin.y);

            if response.drag_started() {
                if let Some(pos) = response.interact_pointer_pos() {
                    let (x, y) = local(pos);
                    self.editor.pointer_down(x, y);
                }
            } else if response.dragged() {
                if let Some(pos) = response.interact_pointer_pos() {
                    let (x, y) = local(pos);
                    self.editor.pointer_move(x, y);
                }
            }
            if response.drag_stopped() {
                if self.editor.pointer_up() == EditorAction::Discarded {
                    state.notify(
                        NotifyLevel::Info,
                        "Rectángulo demasiado pequeño; el mínimo es 10 px por lado",
                    );
                }
            }
            if response.clicked() {
                if let Some(pos) = response.interact_pointer_pos() {
                    let (x, y) = local(pos);
                    // Un click suelto: con la herramienta de selección elige
                    // o despeja; con el rectángulo produce un trazo degenerado
                    // que se descarta sin aviso.
                    self.editor.pointer_down(x, y);
                    self.editor.pointer_up();
                }
            }
        }

        paint_rois(&painter, origin, self.editor.rois(), self.editor.selected_index());

        if let Some((x1, y1, x2, y2)) = self.editor.drawing_preview() {
            let rect = Rect::from_min_max(
                origin + egui::vec2(x1, y1),
                origin + egui::vec2(x2, y2),
            );
            let color = Color32::from_rgb(0, 123, 255);
            painter.rect_filled(rect, 0.0, color.gamma_multiply(0.2));
            painter.rect_stroke(rect, 0.0, Stroke::new(2.0, color));
        }

        if let Some(index) = self.editor.selected_index() {
            paint_handles(&painter, origin, &self.editor.rois()[index]);
        }
    }

    fn show_roi_list(&mut self, ui: &mut egui::Ui) {
        ui.heading("ROIs");
        ui.separator();
        egui::ScrollArea::vertical().show(ui, |ui| {
            let mut select: Option<usize> = None;
            for (i, roi) in self.editor.rois().iter().enumerate() {
                let selected = self.editor.selected_index() == Some(i);
                let label = format!(
                    "ROI {}: {:.0}x{:.0}",
                    i + 1,
                    roi.width(),
                    roi.height()
                );
                if ui.selectable_label(selected, label).clicked() {
                    select = Some(i);
                }
            }
            if let Some(index) = select {
                self.editor.select(index);
            }
        });
    }
}

impl Default for RoiView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse_and_fall_back() {
        assert_eq!(hex_color("#28a745"), Color32::from_rgb(0x28, 0xa7, 0x45));
        assert_eq!(hex_color("28a745"), Color32::from_rgb(0x28, 0xa7, 0x45));
        assert_eq!(hex_color("no-color"), Color32::from_rgb(0, 123, 255));
    }
}
