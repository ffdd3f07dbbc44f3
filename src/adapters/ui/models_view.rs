use crate::domain::model::ModelRecord;

use super::app::{ConfirmAction, UiCtx};
use super::notifications::NotifyLevel;
use super::state::{DashboardState, Services, UiEvent};

/// Cuántas clases se muestran por fila antes de resumir con "+n".
const VISIBLE_CLASSES: usize = 5;

/// Gestión del catálogo de modelos: tabla, alta y selección del activo.
pub struct ModelsView {
    name: String,
    kind: String,
    path: String,
    description: String,
}

impl ModelsView {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            kind: "yolov8".to_string(),
            path: String::new(),
            description: String::new(),
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

        ui.heading("Modelos registrados");
        ui.add_space(6.0);

        if state.models.is_empty() {
            ui.label("No hay modelos registrados todavía");
        }

        let current = state
            .current_model
            .as_ref()
            .map(|m| m.name.clone())
            .or_else(|| state.config.model.current_model.clone());

        let mut use_request: Option<String> = None;
        egui::ScrollArea::vertical().max_height(320.0).show(ui, |ui| {
            egui::Grid::new("tabla_modelos")
                .striped(true)
                .num_columns(6)
                .spacing([16.0, 6.0])
                .show(ui, |ui| {
                    ui.label(egui::RichText::new("Nombre").strong());
                    ui.label(egui::RichText::new("Tipo").strong());
                    ui.label(egui::RichText::new("Descripción").strong());
                    ui.label(egui::RichText::new("Clases").strong());
                    ui.label("");
                    ui.label("");
                    ui.end_row();

                    for model in &state.models {
                        let is_current = current.as_deref() == Some(model.name.as_str());
                        ui.label(&model.name);
                        ui.label(&model.kind);
                        ui.label(if model.description.is_empty() {
                            "-"
                        } else {
                            model.description.as_str()
                        });
                        ui.label(class_summary(model));

                        if is_current {
                            ui.colored_label(
                                egui::Color32::from_rgb(40, 167, 69),
                                "En uso",
                            );
                        } else {
                            let button = ui.add_enabled(
                                !state.busy.switching_model,
                                egui::Button::new("Usar"),
                            );
                            if button.clicked() {
                                use_request = Some(model.name.clone());
                            }
                        }

                        let delete = ui.add_enabled(
                            !state.busy.deleting_model,
                            egui::Button::new("Eliminar"),
                        );
                        if delete.clicked() {
                            confirm = Some(ConfirmAction::DeleteModel(model.name.clone()));
                        }
                        ui.end_row();
                    }
                });
        });

        if let Some(name) = use_request {
            state.busy.switching_model = true;
            let models = services.models.clone();
            uic.spawn(async move {
                let result = models.use_model(&name).await;
                UiEvent::ModelSwitched { name, result }
            });
        }

        ui.add_space(12.0);
        ui.separator();
        ui.heading("Añadir modelo");
        ui.add_space(6.0);

        egui::Grid::new("form_modelo")
            .num_columns(2)
            .spacing([12.0, 6.0])
            .show(ui, |ui| {
                ui.label("Nombre");
                ui.text_edit_singleline(&mut self.name);
                ui.end_row();

                ui.label("Tipo");
                egui::ComboBox::from_id_salt("tipo_modelo")
                    .selected_text(self.kind.clone())
                    .show_ui(ui, |ui| {
                        ui.selectable_value(&mut self.kind, "yolov8".to_string(), "YOLOv8");
                        ui.selectable_value(&mut self.kind, "yolov5".to_string(), "YOLOv5");
                    });
                ui.end_row();

                ui.label("Ruta (.onnx)");
                ui.text_edit_singleline(&mut self.path);
                ui.end_row();

                ui.label("Descripción");
                ui.text_edit_singleline(&mut self.description);
                ui.end_row();
            });

        ui.horizontal(|ui| {
            let submit = ui.add_enabled(
                !state.busy.saving_model,
                egui::Button::new("Guardar modelo"),
            );
            if state.busy.saving_model {
                ui.spinner();
            }
            if submit.clicked() {
                if self.name.trim().is_empty() || self.path.trim().is_empty() {
                    state.notify(
                        NotifyLevel::Warning,
                        "El nombre y la ruta del modelo son obligatorios",
                    );
                } else {
                    state.busy.saving_model = true;
                    let record = ModelRecord {
                        name: self.name.trim().to_string(),
                        kind: self.kind.clone(),
                        path: self.path.trim().to_string(),
                        description: self.description.trim().to_string(),
                        classes: Vec::new(),
                    };
                    self.name.clear();
                    self.path.clear();
                    self.description.clear();
                    let models = services.models.clone();
                    uic.spawn(async move {
                        UiEvent::ModelAdded(models.add(&record).await)
                    });
                }
            }
        });

        confirm
    }
}

fn class_summary(model: &ModelRecord) -> String {
    if model.classes.is_empty() {
        return "Sin clases extraídas".to_string();
    }
    let visible: Vec<&str> = model
        .classes
        .iter()
        .take(VISIBLE_CLASSES)
        .map(String::as_str)
        .collect();
    let hidden = model.classes.len().saturating_sub(VISIBLE_CLASSES);
    if hidden > 0 {
        format!(
            "{} clases: {} +{hidden}",
            model.classes.len(),
            visible.join(", ")
        )
    } else {
        format!("{} clases: {}", model.classes.len(), visible.join(", "))
    }
}

impl Default for ModelsView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with_classes(n: usize) -> ModelRecord {
        ModelRecord {
            name: "m".to_string(),
            kind: "yolov8".to_string(),
            path: "models/m.onnx".to_string(),
            description: String::new(),
            classes: (0..n).map(|i| format!("c{i}")).collect(),
        }
    }

    #[test]
    fn class_summary_truncates_beyond_five() {
        assert_eq!(class_summary(&model_with_classes(0)), "Sin clases extraídas");
        assert_eq!(class_summary(&model_with_classes(2)), "2 clases: c0, c1");
        assert_eq!(
            class_summary(&model_with_classes(7)),
            "7 clases: c0, c1, c2, c3, c4 +2"
        );
    }
}
