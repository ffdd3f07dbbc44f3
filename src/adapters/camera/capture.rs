use image::{ImageFormat, Rgb, RgbImage};
use v4l::format::FourCC;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::application::ports::CameraPort;
use crate::domain::errors::{DomainError, DomainResult};

/// Calidad JPEG fija para los frames capturados.
const JPEG_QUALITY: u8 = 90;

/// Buffers MMAP del stream transitorio de captura.
const STREAM_BUFFERS: u32 = 2;

/// Adaptador de cámara sobre V4L2 para captura de frames sueltos.
///
/// La cámara es un recurso compartido del sistema: `start` abre el
/// dispositivo, `stop` lo libera de verdad (se suelta el descriptor), y el
/// stream MMAP solo vive durante cada `grab_jpeg`. Así nunca hay más de un
/// stream activo y otro proceso puede usar la cámara en cuanto se para.
pub struct V4lCamera {
    device_path: String,
    device: Option<Device>,
    fourcc: String,
    width: u32,
    height: u32,
}

impl V4lCamera {
    pub fn new(device_path: &str) -> Self {
        Self {
            device_path: device_path.to_string(),
            device: None,
            fourcc: String::new(),
            width: 0,
            height: 0,
        }
    }
}

impl CameraPort for V4lCamera {
    fn start(&mut self) -> DomainResult<()> {
        if self.device.is_some() {
            return Ok(());
        }

        let dev = Device::with_path(&self.device_path).map_err(|e| {
            DomainError::OperationFailed(format!(
                "No se pudo abrir la cámara {}: {e}",
                self.device_path
            ))
        })?;

        // Se pide MJPG a 640x480; el driver puede ajustar a lo más cercano.
        let mut fmt = dev
            .format()
            .map_err(|e| DomainError::OperationFailed(format!("Formato de cámara: {e}")))?;
        fmt.fourcc = FourCC::new(b"MJPG");
        fmt.width = 640;
        fmt.height = 480;
        let actual = dev
            .set_format(&fmt)
            .map_err(|e| DomainError::OperationFailed(format!("Formato de cámara: {e}")))?;

        self.fourcc = actual.fourcc.str().unwrap_or("????").to_string();
        self.width = actual.width;
        self.height = actual.height;
        self.device = Some(dev);

        tracing::info!(
            "📷 Cámara activa: {}x{} [{}] en {}",
            self.width,
            self.height,
            self.fourcc,
            self.device_path
        );
        Ok(())
    }

    fn stop(&mut self) {
        if self.device.take().is_some() {
            tracing::info!("Cámara liberada: {}", self.device_path);
        }
    }

    fn is_active(&self) -> bool {
        self.device.is_some()
    }

    fn grab_jpeg(&mut self) -> DomainResult<Vec<u8>> {
        let dev = self.device.as_ref().ok_or_else(|| {
            DomainError::InvalidInput("La cámara no está activa".to_string())
        })?;

        let mut stream = Stream::with_buffers(dev, v4l::buffer::Type::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| DomainError::OperationFailed(format!("Stream de cámara: {e}")))?;

        // El primer frame tras abrir el stream suele salir a medio exponer.
        let _ = stream
            .next()
            .map_err(|e| DomainError::OperationFailed(format!("Captura: {e}")))?;
        let (data, _meta) = stream
            .next()
            .map_err(|e| DomainError::OperationFailed(format!("Captura: {e}")))?;

        match self.fourcc.as_str() {
            "MJPG" => {
                // MJPG ya es JPEG, pero se reencodea a la calidad fija del
                // cliente para que todas las capturas suban iguales.
                let img = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
                    .map_err(|e| DomainError::OperationFailed(format!("Frame MJPG: {e}")))?;
                encode_jpeg(&img.to_rgb8(), self.width, self.height)
            }
            "YUYV" => {
                let rgb = yuyv_to_rgb(data, self.width, self.height);
                encode_jpeg(&rgb, self.width, self.height)
            }
            other => Err(DomainError::OperationFailed(format!(
                "Formato de cámara {other} no soportado"
            ))),
        }
    }
}

fn encode_jpeg(rgb: &RgbImage, width: u32, height: u32) -> DomainResult<Vec<u8>> {
    let mut jpeg = Vec::new();
    let mut enc = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    enc.encode(rgb.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| DomainError::OperationFailed(format!("Codificación JPEG: {e}")))?;
    Ok(jpeg)
}

/// Conversión YUYV (YUV 4:2:2) a RGB, fila a fila. Cada 4 bytes [Y0 U Y1 V]
/// producen dos píxeles que comparten croma.
fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> RgbImage {
    let mut out = RgbImage::new(width, height);
    let stride = width as usize * 2;

    for (row, bytes) in yuyv.chunks_exact(stride).take(height as usize).enumerate() {
        let y = row as u32;
        for (pair, px) in bytes.chunks_exact(4).enumerate() {
            let y0 = px[0] as f32;
            let u = px[1] as f32 - 128.0;
            let y1 = px[2] as f32;
            let v = px[3] as f32 - 128.0;

            let x = pair as u32 * 2;
            out.put_pixel(x, y, Rgb(bt601(y0, u, v)));
            if x + 1 < width {
                out.put_pixel(x + 1, y, Rgb(bt601(y1, u, v)));
            }
        }
    }
    out
}

/// Fórmulas estándar BT.601.
fn bt601(y: f32, u: f32, v: f32) -> [u8; 3] {
    [
        (y + 1.402 * v).clamp(0.0, 255.0) as u8,
        (y - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8,
        (y + 1.772 * u).clamp(0.0, 255.0) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_neutral_chroma_gives_gray() {
        // Dos píxeles con luma 128 y croma neutra.
        let yuyv = [128u8, 128, 128, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1);
        assert_eq!(rgb.get_pixel(0, 0).0, [128, 128, 128]);
        assert_eq!(rgb.get_pixel(1, 0).0, [128, 128, 128]);
    }

    #[test]
    fn yuyv_red_chroma_tints_red() {
        // V alto empuja el canal rojo.
        let yuyv = [128u8, 128, 128, 255];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1);
        let px = rgb.get_pixel(0, 0).0;
        assert!(px[0] > 200, "rojo esperado: {px:?}");
        assert!(px[2] < 140, "azul contenido: {px:?}");
    }

    #[test]
    fn grab_without_start_is_rejected() {
        let mut cam = V4lCamera::new("/dev/video99");
        assert!(!cam.is_active());
        assert!(matches!(
            cam.grab_jpeg(),
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[test]
    fn encode_jpeg_produces_jfif_header() {
        let rgb = RgbImage::from_pixel(8, 8, Rgb([10, 200, 30]));
        let jpeg = encode_jpeg(&rgb, 8, 8).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
    }
}
