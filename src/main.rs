use std::sync::Arc;

use clap::Parser;

use yolo_dashboard_client::adapters::camera::capture::V4lCamera;
use yolo_dashboard_client::adapters::http::client::HttpApiClient;
use yolo_dashboard_client::adapters::socket::channel::WsDetectionChannel;
use yolo_dashboard_client::adapters::ui::app::DashboardApp;
use yolo_dashboard_client::adapters::ui::state::Services;
use yolo_dashboard_client::application::services::{
    DetectionService, ImageSourceService, LogicService, ModelService, RoiService,
};

#[derive(Parser)]
#[command(name = "yolo-dashboard-client")]
#[command(about = "Cliente de escritorio para el dashboard de detección YOLO", long_about = None)]
struct Args {
    /// URL base del servidor de detección
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    server: String,

    /// Dispositivo de cámara para la captura de frames
    #[arg(long, default_value = "/dev/video0")]
    camera: String,

    /// Emite `detect` sin rule_name (forma antigua del protocolo)
    #[arg(long)]
    legacy_detect: bool,
}

/// Deriva la URL del canal WebSocket a partir de la URL base HTTP.
fn ws_url_for(server: &str) -> String {
    let ws = if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{server}")
    };
    format!("{}/ws", ws.trim_end_matches('/'))
}

fn main() -> anyhow::Result<()> {
    // 1. Inicializar logs (RUST_LOG=info por defecto)
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    // 2. Runtime compartido para la red y la cámara; la interfaz se queda
    // con el hilo principal.
    let runtime = tokio::runtime::Runtime::new()?;
    let handle = runtime.handle().clone();

    // 3. Instanciar adaptadores (capa de infraestructura)
    let api = Arc::new(HttpApiClient::new(&args.server));
    let channel = Arc::new(WsDetectionChannel::new(&ws_url_for(&args.server)));
    let camera = Box::new(V4lCamera::new(&args.camera));

    // 4. Instanciar servicios (capa de aplicación)
    let services = Services {
        api: api.clone(),
        images: Arc::new(ImageSourceService::new(api.clone(), camera)),
        detection: Arc::new(DetectionService::new(channel, !args.legacy_detect)),
        models: ModelService::new(api.clone()),
        rois: RoiService::new(api.clone()),
        logic: LogicService::new(api),
    };

    tracing::info!("🚀 Cliente del dashboard YOLO contra {}", args.server);

    // 5. Lanzar la interfaz
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1280.0, 820.0]),
        ..Default::default()
    };
    eframe::run_native(
        "YOLO Dashboard",
        options,
        Box::new(move |cc| Ok(Box::new(DashboardApp::new(cc, services, handle)))),
    )
    .map_err(|e| anyhow::anyhow!("La interfaz terminó con error: {e}"))?;

    drop(runtime);
    Ok(())
}
