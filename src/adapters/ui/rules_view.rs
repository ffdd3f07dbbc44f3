use egui::{Color32, Pos2, Rect, Stroke, TextureHandle};

use crate::application::services::{build_rule, validate_rule_config};
use crate::domain::detection::count_in_roi;
use crate::domain::rules::{CmpOperator, LogicRule, RuleConfig};

use super::app::{ConfirmAction, UiCtx};
use super::notifications::NotifyLevel;
use super::roi_view::{paint_rois, CANVAS_SIZE};
use super::state::{DashboardState, Services, UiEvent};

/// Editor de configuraciones de reglas lógicas: formulario, tabla de reglas
/// y previsualización de los ROIs referenciados.
pub struct RulesView {
    current_name: Option<String>,
    name_input: String,
    roi_config: Option<String>,
    model: Option<String>,
    roi_index: Option<usize>,
    class_name: Option<String>,
    operator: CmpOperator,
    count_input: String,
    rules: Vec<LogicRule>,
    dirty: bool,
    pub preview_texture: Option<TextureHandle>,
}

impl RulesView {
    pub fn new() -> Self {
        Self {
            current_name: None,
            name_input: String::new(),
            roi_config: None,
            model: None,
            roi_index: None,
            class_name: None,
            operator: CmpOperator::Ge,
            count_input: "1".to_string(),
            rules: Vec::new(),
            dirty: false,
            preview_texture: None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub fn on_config_deleted(&mut self, name: &str) {
        if self.current_name.as_deref() == Some(name) {
            self.reset_form();
        }
    }

    fn reset_form(&mut self) {
        self.current_name = None;
        self.name_input.clear();
        self.roi_config = None;
        self.model = None;
        self.roi_index = None;
        self.class_name = None;
        self.operator = CmpOperator::Ge;
        self.count_input = "1".to_string();
        self.rules.clear();
        self.dirty = false;
    }

    fn load_config(
        &mut self,
        name: &str,
        state: &DashboardState,
        services: &Services,
        uic: &UiCtx,
    ) {
        let Some(config) = state.rule_configs.get(name) else {
            return;
        };
        self.current_name = Some(name.to_string());
        self.name_input = name.to_string();
        self.roi_config = Some(config.roi_config.clone());
        self.model = Some(config.model.clone());
        self.rules = config.rules.clone();
        self.roi_index = None;
        self.class_name = None;
        self.dirty = false;
        self.request_roi_detail(config.roi_config.clone(), services, uic);
    }

    /// Pide al servidor el detalle del ROI config para la previsualización.
    fn request_roi_detail(&self, name: String, services: &Services, uic: &UiCtx) {
        let rois = services.rois.clone();
        uic.spawn(async move {
            let result = rois.fetch_one(&name).await;
            UiEvent::RuleRoiDetailLoaded { name, result }
        });
    }

    /// Número de ROIs de la configuración elegida, para validar índices.
    fn roi_count(&self, state: &DashboardState) -> usize {
        let Some(wanted) = self.roi_config.as_deref() else {
            return 0;
        };
        if let Some((name, config)) = &state.rule_preview {
            if name == wanted {
                return config.rois.len();
            }
        }
        state
            .roi_configs
            .get(wanted)
            .map(|c| c.rois.len())
            .unwrap_or(0)
    }

    fn classes_of_selected_model(&self, state: &DashboardState) -> Vec<String> {
        let Some(wanted) = self.model.as_deref() else {
            return Vec::new();
        };
        state
            .models
            .iter()
            .chain(state.config.models.iter())
            .find(|m| m.name == wanted)
            .map(|m| m.classes.clone())
            .unwrap_or_default()
    }

    pub fn show(
        &mut self,
        ui: &mut egui::Ui,
        state: &mut DashboardState,
        services: &Services,
        uic: &UiCtx,
    ) -> Option<ConfirmAction> {
        let mut confirm = None;

        egui::SidePanel::right("panel_preview_reglas")
            .default_width(CANVAS_SIZE / 2.0 + 20.0)
            .show_inside(ui, |ui| {
                self.show_preview(ui, state);
            });

        egui::CentralPanel::default().show_inside(ui, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                if let Some(action) = self.show_form(ui, state, services, uic) {
                    confirm = Some(action);
                }
            });
        });

        confirm
    }

    fn show_form(
        &mut self,
        ui: &mut egui::Ui,
        state: &mut DashboardState,
        services: &Services,
        uic: &UiCtx,
    ) -> Option<ConfirmAction> {
        let mut confirm = None;

        ui.heading("Reglas lógicas");
        ui.add_space(6.0);

        // Selector de configuración existente.
        ui.horizontal(|ui| {
            ui.label("Configuración:");
            let selected_text = self
                .current_name
                .clone()
                .unwrap_or_else(|| "Nueva configuración…".to_string());
            let mut picked: Option<Option<String>> = None;
            egui::ComboBox::from_id_salt("regla_editor_config")
                .width(220.0)
                .selected_text(selected_text)
                .show_ui(ui, |ui| {
                    if ui
                        .selectable_label(self.current_name.is_none(), "Nueva configuración…")
                        .clicked()
                    {
                        picked = Some(None);
                    }
                    for name in state.rule_configs.keys() {
                        let current = self.current_name.as_deref() == Some(name.as_str());
                        if ui.selectable_label(current, name).clicked() {
                            picked = Some(Some(name.clone()));
                        }
                    }
                });
            match picked {
                Some(None) => self.reset_form(),
                Some(Some(name)) => self.load_config(&name, state, services, uic),
                None => {}
            }

            if let Some(name) = self.current_name.clone() {
                let delete = ui.add_enabled(
                    !state.busy.deleting_rule,
                    egui::Button::new("Eliminar configuración"),
                );
                if delete.clicked() {
                    confirm = Some(ConfirmAction::DeleteRuleConfig(name));
                }
            }
        });

        ui.add_space(8.0);

        egui::Grid::new("form_regla")
            .num_columns(2)
            .spacing([12.0, 6.0])
            .show(ui, |ui| {
                ui.label("Nombre");
                if ui.text_edit_singleline(&mut self.name_input).changed() {
                    self.dirty = true;
                }
                ui.end_row();

                ui.label("ROI config");
                let roi_text = self
                    .roi_config
                    .clone()
                    .unwrap_or_else(|| "Selecciona…".to_string());
                let mut picked_roi: Option<String> = None;
                egui::ComboBox::from_id_salt("regla_roi_config")
                    .selected_text(roi_text)
                    .show_ui(ui, |ui| {
                        for name in state.roi_configs.keys() {
                            let current = self.roi_config.as_deref() == Some(name.as_str());
                            if ui.selectable_label(current, name).clicked() {
                                picked_roi = Some(name.clone());
                            }
                        }
                    });
                if let Some(name) = picked_roi {
                    if self.roi_config.as_deref() != Some(name.as_str()) {
                        self.roi_config = Some(name.clone());
                        self.roi_index = None;
                        self.dirty = true;
                        self.request_roi_detail(name, services, uic);
                    }
                }
                ui.end_row();

                ui.label("Modelo");
                let model_text = self
                    .model
                    .clone()
                    .unwrap_or_else(|| "Selecciona…".to_string());
                egui::ComboBox::from_id_salt("regla_modelo")
                    .selected_text(model_text)
                    .show_ui(ui, |ui| {
                        for model in &state.models {
                            let current = self.model.as_deref() == Some(model.name.as_str());
                            if ui.selectable_label(current, &model.name).clicked()
                                && self.model.as_deref() != Some(model.name.as_str())
                            {
                                self.model = Some(model.name.clone());
                                self.class_name = None;
                                self.dirty = true;
                            }
                        }
                    });
                ui.end_row();
            });

        ui.add_space(8.0);
        ui.label(egui::RichText::new("Nueva regla").strong());

        let roi_count = self.roi_count(state);
        let classes = self.classes_of_selected_model(state);

        ui.horizontal(|ui| {
            let roi_text = self
                .roi_index
                .map(|i| format!("ROI {}", i + 1))
                .unwrap_or_else(|| "Región…".to_string());
            egui::ComboBox::from_id_salt("regla_roi_idx")
                .width(90.0)
                .selected_text(roi_text)
                .show_ui(ui, |ui| {
                    for i in 0..roi_count {
                        if ui
                            .selectable_label(self.roi_index == Some(i), format!("ROI {}", i + 1))
                            .clicked()
                        {
                            self.roi_index = Some(i);
                        }
                    }
                });

            let class_text = self
                .class_name
                .clone()
                .unwrap_or_else(|| "Clase…".to_string());
            egui::ComboBox::from_id_salt("regla_clase")
                .width(110.0)
                .selected_text(class_text)
                .show_ui(ui, |ui| {
                    for class in &classes {
                        if ui
                            .selectable_label(
                                self.class_name.as_deref() == Some(class.as_str()),
                                class,
                            )
                            .clicked()
                        {
                            self.class_name = Some(class.clone());
                        }
                    }
                });

            egui::ComboBox::from_id_salt("regla_operador")
                .width(60.0)
                .selected_text(self.operator.as_str())
                .show_ui(ui, |ui| {
                    for op in CmpOperator::ALL {
                        ui.selectable_value(&mut self.operator, op, op.as_str());
                    }
                });

            ui.add(
                egui::TextEdit::singleline(&mut self.count_input).desired_width(50.0),
            );

            if ui.button("Añadir regla").clicked() {
                match build_rule(
                    self.roi_index,
                    roi_count,
                    self.class_name.as_deref(),
                    self.operator,
                    &self.count_input,
                ) {
                    Ok(rule) => {
                        self.rules.push(rule);
                        self.dirty = true;
                        state.notify(
                            NotifyLevel::Info,
                            "Regla añadida; recuerda guardar la configuración",
                        );
                    }
                    Err(err) => state.notify(NotifyLevel::Warning, err.to_string()),
                }
            }
        });

        ui.add_space(8.0);
        if self.rules.is_empty() {
            ui.label("Todavía no hay reglas; añade al menos una para poder guardar");
        } else {
            let mut remove: Option<usize> = None;
            egui::Grid::new("tabla_reglas")
                .striped(true)
                .num_columns(2)
                .show(ui, |ui| {
                    for (i, rule) in self.rules.iter().enumerate() {
                        let stale = rule.roi_id >= roi_count;
                        if stale {
                            ui.colored_label(
                                Color32::from_rgb(220, 53, 69),
                                format!("{} (ROI inexistente)", rule.describe()),
                            );
                        } else if state.results.is_empty() {
                            ui.label(rule.describe());
                        } else {
                            // Con resultados a mano se enseña el valor actual.
                            let actual = count_in_roi(
                                &state.results,
                                rule.roi_id,
                                &rule.class_name,
                            );
                            ui.label(format!("{} · actual: {actual}", rule.describe()));
                        }
                        if ui.small_button("Quitar").clicked() {
                            remove = Some(i);
                        }
                        ui.end_row();
                    }
                });
            if let Some(index) = remove {
                self.rules.remove(index);
                self.dirty = true;
            }
        }

        ui.add_space(10.0);
        ui.horizontal(|ui| {
            let save = ui.add_enabled(
                !state.busy.saving_rule,
                egui::Button::new("Guardar configuración"),
            );
            if state.busy.saving_rule {
                ui.spinner();
            }
            if save.clicked() {
                // Validación local campo a campo antes de cualquier llamada.
                let check = validate_rule_config(
                    &self.name_input,
                    self.roi_config.as_deref(),
                    self.model.as_deref(),
                    &self.rules,
                    roi_count,
                );
                match check {
                    Err(err) => state.notify(NotifyLevel::Warning, err.to_string()),
                    Ok(()) => {
                        let name = self.name_input.trim().to_string();
                        let config = RuleConfig {
                            roi_config: self.roi_config.clone().unwrap_or_default(),
                            model: self.model.clone().unwrap_or_default(),
                            rules: self.rules.clone(),
                        };
                        state.busy.saving_rule = true;
                        self.current_name = Some(name.clone());
                        let logic = services.logic.clone();
                        uic.spawn(async move {
                            let result = logic.save(&name, &config, roi_count).await;
                            UiEvent::RuleSaved { name, result }
                        });
                    }
                }
            }

            if self.dirty {
                ui.colored_label(Color32::from_rgb(255, 193, 7), "Cambios sin guardar");
            }
        });

        confirm
    }

    fn show_preview(&mut self, ui: &mut egui::Ui, state: &DashboardState) {
        ui.heading("Previsualización");
        ui.separator();

        let Some(wanted) = self.roi_config.as_deref() else {
            ui.label("Selecciona una configuración de ROIs");
            return;
        };
        let rois = match &state.rule_preview {
            Some((name, config)) if name == wanted => config.rois.clone(),
            _ => state
                .roi_configs
                .get(wanted)
                .map(|c| c.rois.clone())
                .unwrap_or_default(),
        };

        let scale = 0.5;
        let side = CANVAS_SIZE * scale;
        let (response, painter) =
            ui.allocate_painter(egui::vec2(side, side), egui::Sense::hover());
        let origin = response.rect.min;

        painter.rect_filled(response.rect, 0.0, Color32::from_gray(24));
        if let Some(texture) = &self.preview_texture {
            painter.image(
                texture.id(),
                response.rect,
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        }

        // Se pinta a media escala.
        let scaled: Vec<_> = rois
            .iter()
            .map(|roi| {
                let mut r = roi.clone();
                scale_roi(&mut r, scale);
                r
            })
            .collect();
        paint_rois(&painter, origin, &scaled, self.roi_index);

        // Resalte adicional del ROI elegido en el formulario.
        if let Some(index) = self.roi_index {
            if let Some(roi) = scaled.get(index) {
                let (x1, y1, x2, y2) = roi.bounds();
                let rect = Rect::from_min_max(
                    origin + egui::vec2(x1, y1),
                    origin + egui::vec2(x2, y2),
                );
                painter.rect_stroke(rect, 0.0, Stroke::new(4.0, Color32::from_rgb(255, 87, 34)));
            }
        }
    }
}

fn scale_roi(roi: &mut crate::domain::roi::Roi, factor: f32) {
    use crate::domain::roi::Roi;
    match roi {
        Roi::Rectangle { x1, y1, x2, y2, .. } => {
            *x1 *= factor;
            *y1 *= factor;
            *x2 *= factor;
            *y2 *= factor;
        }
        Roi::Polygon { points, .. } => {
            for p in points.iter_mut() {
                p[0] *= factor;
                p[1] *= factor;
            }
        }
    }
}

impl Default for RulesView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::roi::Roi;

    #[test]
    fn scale_roi_halves_geometry() {
        let mut roi = Roi::rectangle(10.0, 20.0, 110.0, 80.0, "#007bff");
        scale_roi(&mut roi, 0.5);
        assert_eq!(roi.bounds(), (5.0, 10.0, 55.0, 40.0));
    }
}
