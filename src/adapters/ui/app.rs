use std::future::Future;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Duration;

use egui::{Align2, Color32, TextureOptions};
use tokio::sync::broadcast::error::RecvError;

use crate::application::dto::{ChannelEvent, ServerPush};

use super::detection_view::DetectionView;
use super::models_view::ModelsView;
use super::notifications::NotifyLevel;
use super::roi_view::RoiView;
use super::rules_view::RulesView;
use super::state::{DashboardState, ImageSlot, Services, UiEvent};

/// Pestañas de la aplicación, una por página del dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Detection,
    RoiEditor,
    Models,
    Rules,
}

/// Acciones destructivas o con pérdida de cambios que pasan por el diálogo
/// de confirmación antes de ejecutarse.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmAction {
    DeleteModel(String),
    DeleteRoiConfig(String),
    DeleteRuleConfig(String),
    SwitchRoiConfig(String),
    SwitchTab(Tab),
    CloseApp,
}

/// Contexto que las vistas usan para lanzar trabajo en el runtime: cada
/// tarea termina mandando un único UiEvent al despachador y despertando el
/// repintado.
#[derive(Clone)]
pub struct UiCtx {
    runtime: tokio::runtime::Handle,
    tx: Sender<UiEvent>,
    egui: egui::Context,
}

impl UiCtx {
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = UiEvent> + Send + 'static,
    {
        let tx = self.tx.clone();
        let ctx = self.egui.clone();
        self.runtime.spawn(async move {
            let _ = tx.send(fut.await);
            ctx.request_repaint();
        });
    }
}

/// Aplicación de escritorio del dashboard. El estado tipado vive aquí y
/// solo lo muta el despachador único; las vistas leen y disparan tareas.
pub struct DashboardApp {
    state: DashboardState,
    services: Services,
    runtime: tokio::runtime::Handle,
    tx: Sender<UiEvent>,
    rx: Receiver<UiEvent>,
    tab: Tab,
    detection_view: DetectionView,
    roi_view: RoiView,
    models_view: ModelsView,
    rules_view: RulesView,
    confirm: Option<ConfirmAction>,
    allow_close: bool,
    fetched_images: [Option<String>; 4],
}

const IMAGE_SLOTS: [ImageSlot; 4] = [
    ImageSlot::Preview,
    ImageSlot::Result,
    ImageSlot::RoiBackground,
    ImageSlot::RulePreview,
];

impl DashboardApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        services: Services,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        let (tx, rx) = channel();
        let mut app = Self {
            state: DashboardState::new(),
            services,
            runtime,
            tx,
            rx,
            tab: Tab::Detection,
            detection_view: DetectionView::new(),
            roi_view: RoiView::new(),
            models_view: ModelsView::new(),
            rules_view: RulesView::new(),
            confirm: None,
            allow_close: false,
            fetched_images: [None, None, None, None],
        };
        app.bootstrap(&cc.egui_ctx);
        app
    }

    fn ui_ctx(&self, ctx: &egui::Context) -> UiCtx {
        UiCtx {
            runtime: self.runtime.clone(),
            tx: self.tx.clone(),
            egui: ctx.clone(),
        }
    }

    /// Cargas iniciales: configuración, canal, modelos, ROIs y reglas.
    fn bootstrap(&mut self, ctx: &egui::Context) {
        let api = self.services.api.clone();
        self.ui_ctx(ctx)
            .spawn(async move { UiEvent::ConfigLoaded(api.fetch_config().await) });

        self.start_channel(ctx);
        self.refresh_models(ctx);
        self.refresh_roi_configs(ctx);
        self.refresh_rule_configs(ctx);
    }

    /// Abre el canal (idempotente) y bombea sus eventos hacia el
    /// despachador hasta la desconexión.
    fn start_channel(&mut self, ctx: &egui::Context) {
        let detection = self.services.detection.clone();
        let tx = self.tx.clone();
        let egui_ctx = ctx.clone();
        self.runtime.spawn(async move {
            match detection.connect().await {
                Ok(mut rx) => {
                    let _ = tx.send(UiEvent::ChannelReady(Ok(())));
                    egui_ctx.request_repaint();
                    loop {
                        match rx.recv().await {
                            Ok(event) => {
                                let disconnected =
                                    matches!(event, ChannelEvent::Disconnected);
                                let _ = tx.send(UiEvent::Channel(event));
                                egui_ctx.request_repaint();
                                if disconnected {
                                    break;
                                }
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                tracing::warn!("Canal retrasado: {skipped} eventos perdidos");
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                }
                Err(err) => {
                    let _ = tx.send(UiEvent::ChannelReady(Err(err)));
                    egui_ctx.request_repaint();
                }
            }
        });
    }

    fn refresh_models(&mut self, ctx: &egui::Context) {
        let token = self.state.begin_models_fetch();
        let models = self.services.models.clone();
        self.ui_ctx(ctx).spawn(async move {
            UiEvent::ModelsLoaded {
                token,
                result: models.list().await,
            }
        });
    }

    fn refresh_config(&mut self, ctx: &egui::Context) {
        let api = self.services.api.clone();
        self.ui_ctx(ctx)
            .spawn(async move { UiEvent::ConfigLoaded(api.fetch_config().await) });
    }

    fn refresh_roi_configs(&mut self, ctx: &egui::Context) {
        let token = self.state.begin_roi_configs_fetch();
        let rois = self.services.rois.clone();
        self.ui_ctx(ctx).spawn(async move {
            UiEvent::RoiConfigsLoaded {
                token,
                result: rois.fetch_all().await,
            }
        });
    }

    fn refresh_rule_configs(&mut self, ctx: &egui::Context) {
        let token = self.state.begin_rule_configs_fetch();
        let logic = self.services.logic.clone();
        self.ui_ctx(ctx).spawn(async move {
            UiEvent::RuleConfigsLoaded {
                token,
                result: logic.fetch_all().await,
            }
        });
    }

    /// Efectos colaterales de cada evento antes de pasarlo al despachador:
    /// banderas de los servicios, refrescos dependientes y texturas.
    fn handle_event(&mut self, ctx: &egui::Context, event: UiEvent) {
        match &event {
            UiEvent::ConfigLoaded(Ok(config)) => {
                self.services.images.set_limits(config.upload.clone());
            }
            UiEvent::Channel(ChannelEvent::Push(push)) => {
                // El servicio es la autoridad sobre la bandera de modelo.
                self.services.detection.apply_push(push);

                if let ServerPush::DetectionResults {
                    success: true,
                    results,
                    rule_name,
                    ..
                } = push
                {
                    let rule = rule_name
                        .clone()
                        .or_else(|| self.state.selected_rule.clone());
                    if let Some(rule) = rule {
                        self.state.busy.validating = true;
                        let logic = self.services.logic.clone();
                        let results = results.clone();
                        self.ui_ctx(ctx).spawn(async move {
                            UiEvent::ValidationFinished(
                                logic.validate_detection(&rule, &results).await,
                            )
                        });
                    }
                }
            }
            UiEvent::ModelAdded(Ok(())) => self.refresh_models(ctx),
            UiEvent::ModelDeleted { result: Ok(()), .. } => self.refresh_models(ctx),
            UiEvent::ModelSwitched { result: Ok(_), .. } => {
                // El refresco llega tras la confirmación del servidor; la
                // bandera de carga la pondrá el push `model_loaded`.
                self.refresh_models(ctx);
                self.refresh_config(ctx);
            }
            UiEvent::RoiConfigsSaved(Ok(())) => {
                self.roi_view.editor.mark_saved();
            }
            UiEvent::RoiConfigDeleted {
                name,
                result: Ok(()),
            } => {
                self.roi_view.on_config_deleted(name);
            }
            UiEvent::BackgroundUploaded(Ok(url)) => {
                self.roi_view.set_background(url.clone());
            }
            UiEvent::RuleSaved { result: Ok(_), .. } => {
                self.rules_view.mark_saved();
                self.refresh_rule_configs(ctx);
            }
            UiEvent::RuleDeleted {
                name,
                result: Ok(_),
            } => {
                let name = name.clone();
                self.rules_view.on_config_deleted(&name);
            }
            _ => {}
        }
        self.state.apply(event);
    }

    fn desired_image(&self, slot: ImageSlot) -> Option<String> {
        match slot {
            ImageSlot::Preview => self.state.preview_path.clone(),
            ImageSlot::Result => self.state.result_image.clone(),
            ImageSlot::RoiBackground => self.roi_view.background_url.clone(),
            ImageSlot::RulePreview => self
                .state
                .rule_preview
                .as_ref()
                .and_then(|(_, config)| config.background.clone()),
        }
    }

    fn clear_texture(&mut self, slot: ImageSlot) {
        match slot {
            ImageSlot::Preview => self.detection_view.preview_texture = None,
            ImageSlot::Result => self.detection_view.result_texture = None,
            ImageSlot::RoiBackground => self.roi_view.background_texture = None,
            ImageSlot::RulePreview => self.rules_view.preview_texture = None,
        }
    }

    fn install_texture(&mut self, slot: ImageSlot, texture: egui::TextureHandle) {
        match slot {
            ImageSlot::Preview => self.detection_view.preview_texture = Some(texture),
            ImageSlot::Result => self.detection_view.result_texture = Some(texture),
            ImageSlot::RoiBackground => self.roi_view.background_texture = Some(texture),
            ImageSlot::RulePreview => self.rules_view.preview_texture = Some(texture),
        }
    }

    /// Mantiene las texturas al día con las URLs que el estado referencia:
    /// descarga lo que falte e instala lo que haya llegado.
    fn sync_images(&mut self, ctx: &egui::Context) {
        for slot in IMAGE_SLOTS {
            let desired = self.desired_image(slot);
            if desired != self.fetched_images[slot.index()] {
                self.fetched_images[slot.index()] = desired.clone();
                match desired {
                    Some(url) => {
                        let token = self.state.begin_image_fetch(slot);
                        let api = self.services.api.clone();
                        self.ui_ctx(ctx).spawn(async move {
                            UiEvent::ImageFetched {
                                slot,
                                token,
                                result: api.fetch_image(&url).await,
                            }
                        });
                    }
                    None => self.clear_texture(slot),
                }
            }
        }

        let pending = std::mem::take(&mut self.state.pending_images);
        for (slot, bytes) in pending {
            match image::load_from_memory(&bytes) {
                Ok(img) => {
                    let rgba = img.to_rgba8();
                    let size = [rgba.width() as usize, rgba.height() as usize];
                    let color = egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw());
                    let texture =
                        ctx.load_texture(format!("imagen_{slot:?}"), color, TextureOptions::LINEAR);
                    self.install_texture(slot, texture);
                }
                Err(e) => tracing::warn!("Imagen descargada ilegible: {e}"),
            }
        }
    }

    fn any_dirty(&self) -> bool {
        self.roi_view.editor.is_dirty() || self.rules_view.is_dirty()
    }

    fn try_switch_tab(&mut self, target: Tab) {
        if target == self.tab {
            return;
        }
        let dirty = match self.tab {
            Tab::RoiEditor => self.roi_view.editor.is_dirty(),
            Tab::Rules => self.rules_view.is_dirty(),
            _ => false,
        };
        if dirty {
            self.confirm = Some(ConfirmAction::SwitchTab(target));
        } else {
            self.tab = target;
        }
    }

    fn confirm_message(&self, action: &ConfirmAction) -> String {
        match action {
            ConfirmAction::DeleteModel(name) => {
                format!("¿Seguro que quieres eliminar el modelo \"{name}\"?")
            }
            ConfirmAction::DeleteRoiConfig(name) => {
                format!("¿Seguro que quieres eliminar la configuración \"{name}\"?")
            }
            ConfirmAction::DeleteRuleConfig(name) => {
                format!("¿Seguro que quieres eliminar la configuración de reglas \"{name}\"?")
            }
            ConfirmAction::SwitchRoiConfig(_) | ConfirmAction::SwitchTab(_) => {
                "Hay cambios sin guardar. ¿Quieres continuar y descartarlos?".to_string()
            }
            ConfirmAction::CloseApp => {
                "Hay cambios sin guardar. ¿Quieres salir de todas formas?".to_string()
            }
        }
    }

    fn run_confirm(&mut self, ctx: &egui::Context, action: ConfirmAction) {
        match action {
            ConfirmAction::DeleteModel(name) => {
                self.state.busy.deleting_model = true;
                let models = self.services.models.clone();
                self.ui_ctx(ctx).spawn(async move {
                    let result = models.delete(&name).await;
                    UiEvent::ModelDeleted { name, result }
                });
            }
            ConfirmAction::DeleteRoiConfig(name) => {
                let rois = self.services.rois.clone();
                self.ui_ctx(ctx).spawn(async move {
                    let result = rois.delete(&name).await;
                    UiEvent::RoiConfigDeleted { name, result }
                });
            }
            ConfirmAction::DeleteRuleConfig(name) => {
                self.state.busy.deleting_rule = true;
                let logic = self.services.logic.clone();
                self.ui_ctx(ctx).spawn(async move {
                    let result = logic.delete(&name).await;
                    UiEvent::RuleDeleted { name, result }
                });
            }
            ConfirmAction::SwitchRoiConfig(name) => {
                self.roi_view.apply_config_switch(&name, &self.state);
            }
            ConfirmAction::SwitchTab(target) => {
                self.tab = target;
            }
            ConfirmAction::CloseApp => {
                self.allow_close = true;
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
        }
    }

    fn handle_close_request(&mut self, ctx: &egui::Context) {
        if ctx.input(|i| i.viewport().close_requested())
            && !self.allow_close
            && self.any_dirty()
        {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            self.confirm = Some(ConfirmAction::CloseApp);
        }
    }

    fn show_top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("barra_superior").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new("YOLO Dashboard").strong());
                ui.separator();

                let tabs = [
                    (Tab::Detection, "Detección"),
                    (Tab::RoiEditor, "Editor de ROIs"),
                    (Tab::Models, "Modelos"),
                    (Tab::Rules, "Reglas"),
                ];
                let mut switch: Option<Tab> = None;
                for (tab, label) in tabs {
                    if ui.selectable_label(self.tab == tab, label).clicked() {
                        switch = Some(tab);
                    }
                }
                if let Some(target) = switch {
                    self.try_switch_tab(target);
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if self.state.connected {
                        ui.colored_label(Color32::from_rgb(40, 167, 69), "● conectado");
                    } else {
                        ui.colored_label(Color32::from_rgb(220, 53, 69), "● desconectado");
                        if ui.button("Reconectar").clicked() {
                            self.start_channel(ctx);
                        }
                    }
                    ui.separator();
                    match (&self.state.current_model, self.state.model_loaded) {
                        (Some(model), true) => {
                            ui.colored_label(
                                Color32::from_rgb(40, 167, 69),
                                format!("Modelo: {}", model.name),
                            );
                        }
                        (Some(model), false) => {
                            ui.colored_label(
                                Color32::from_rgb(255, 193, 7),
                                format!("Modelo: {} (sin cargar)", model.name),
                            );
                        }
                        (None, _) => {
                            ui.colored_label(
                                Color32::from_rgb(255, 193, 7),
                                "Modelo: sin cargar",
                            );
                        }
                    }
                });
            });
        });
    }

    fn show_central(&mut self, ctx: &egui::Context) {
        let uic = self.ui_ctx(ctx);
        let mut confirm = None;
        egui::CentralPanel::default().show(ctx, |ui| {
            confirm = match self.tab {
                Tab::Detection => {
                    self.detection_view
                        .show(ui, &mut self.state, &self.services, &uic)
                }
                Tab::RoiEditor => {
                    self.roi_view
                        .show(ui, &mut self.state, &self.services, &uic)
                }
                Tab::Models => {
                    self.models_view
                        .show(ui, &mut self.state, &self.services, &uic)
                }
                Tab::Rules => {
                    self.rules_view
                        .show(ui, &mut self.state, &self.services, &uic)
                }
            };
        });
        if confirm.is_some() {
            self.confirm = confirm;
        }
    }

    fn show_confirm_dialog(&mut self, ctx: &egui::Context) {
        let Some(action) = self.confirm.clone() else {
            return;
        };
        let mut decided: Option<bool> = None;
        egui::Window::new("Confirmar")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(self.confirm_message(&action));
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Cancelar").clicked() {
                        decided = Some(false);
                    }
                    if ui.button("Confirmar").clicked() {
                        decided = Some(true);
                    }
                });
            });
        match decided {
            Some(true) => {
                self.confirm = None;
                self.run_confirm(ctx, action);
            }
            Some(false) => self.confirm = None,
            None => {}
        }
    }

    fn show_toasts(&mut self, ctx: &egui::Context) {
        if self.state.notifications.is_empty() {
            return;
        }
        egui::Area::new(egui::Id::new("toasts"))
            .anchor(Align2::RIGHT_BOTTOM, egui::vec2(-12.0, -12.0))
            .show(ctx, |ui| {
                for notification in self.state.notifications.iter() {
                    let bg = match notification.level {
                        NotifyLevel::Info => Color32::from_rgb(13, 110, 253),
                        NotifyLevel::Success => Color32::from_rgb(40, 167, 69),
                        NotifyLevel::Warning => Color32::from_rgb(255, 193, 7),
                        NotifyLevel::Danger => Color32::from_rgb(220, 53, 69),
                    };
                    let fg = if notification.level == NotifyLevel::Warning {
                        Color32::BLACK
                    } else {
                        Color32::WHITE
                    };
                    egui::Frame::none()
                        .fill(bg)
                        .rounding(6.0)
                        .inner_margin(10.0)
                        .show(ui, |ui| {
                            ui.colored_label(fg, &notification.text);
                        });
                    ui.add_space(6.0);
                }
            });
        // Repintado periódico para que los toasts caduquen solos.
        ctx.request_repaint_after(Duration::from_millis(250));
    }
}

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        while let Ok(event) = self.rx.try_recv() {
            self.handle_event(ctx, event);
        }
        self.state.notifications.prune();
        self.sync_images(ctx);
        self.handle_close_request(ctx);

        self.show_top_bar(ctx);
        self.show_central(ctx);
        self.show_confirm_dialog(ctx);
        self.show_toasts(ctx);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        // La cámara es un recurso del sistema: se libera siempre al salir.
        let images = self.services.images.clone();
        let _ = self.runtime.block_on(async move {
            images.stop_camera().await;
        });
    }
}
