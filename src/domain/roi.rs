use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lado mínimo (px) para aceptar un rectángulo recién dibujado.
pub const MIN_ROI_SIZE: f32 = 10.0;

/// Paleta fija para colorear ROIs nuevos; se rota por índice para que el
/// color de cada región sea reproducible.
pub const ROI_PALETTE: [&str; 8] = [
    "#007bff", "#28a745", "#dc3545", "#fd7e14",
    "#6f42c1", "#20c997", "#e83e8c", "#6c757d",
];

pub fn palette_color(index: usize) -> &'static str {
    ROI_PALETTE[index % ROI_PALETTE.len()]
}

/// Región de interés dibujada sobre la imagen de fondo. El `type` del JSON
/// distingue rectángulos de polígonos; su id direccionable es la posición
/// dentro de la lista del RoiConfig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Roi {
    Rectangle {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
    Polygon {
        points: Vec<[f32; 2]>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
}

impl Roi {
    pub fn rectangle(x1: f32, y1: f32, x2: f32, y2: f32, color: &str) -> Self {
        Roi::Rectangle {
            x1,
            y1,
            x2,
            y2,
            color: Some(color.to_string()),
        }
    }

    /// Caja envolvente (min_x, min_y, max_x, max_y).
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        match self {
            Roi::Rectangle { x1, y1, x2, y2, .. } => {
                (x1.min(*x2), y1.min(*y2), x1.max(*x2), y1.max(*y2))
            }
            Roi::Polygon { points, .. } => {
                let mut min = (f32::MAX, f32::MAX);
                let mut max = (f32::MIN, f32::MIN);
                for p in points {
                    min.0 = min.0.min(p[0]);
                    min.1 = min.1.min(p[1]);
                    max.0 = max.0.max(p[0]);
                    max.1 = max.1.max(p[1]);
                }
                (min.0, min.1, max.0, max.1)
            }
        }
    }

    /// Test de pertenencia por caja envolvente. Para rectángulos es el test
    /// exacto; para polígonos cargados del servidor basta para seleccionarlos.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let (min_x, min_y, max_x, max_y) = self.bounds();
        x >= min_x && x <= max_x && y >= min_y && y <= max_y
    }

    pub fn width(&self) -> f32 {
        let (min_x, _, max_x, _) = self.bounds();
        max_x - min_x
    }

    pub fn height(&self) -> f32 {
        let (_, min_y, _, max_y) = self.bounds();
        max_y - min_y
    }

    /// Reordena las esquinas de un rectángulo para que (x1, y1) sea la mínima.
    pub fn normalized(self) -> Self {
        match self {
            Roi::Rectangle { x1, y1, x2, y2, color } => Roi::Rectangle {
                x1: x1.min(x2),
                y1: y1.min(y2),
                x2: x1.max(x2),
                y2: y1.max(y2),
                color,
            },
            other => other,
        }
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        match self {
            Roi::Rectangle { x1, y1, x2, y2, .. } => {
                *x1 += dx;
                *y1 += dy;
                *x2 += dx;
                *y2 += dy;
            }
            Roi::Polygon { points, .. } => {
                for p in points.iter_mut() {
                    p[0] += dx;
                    p[1] += dy;
                }
            }
        }
    }

    pub fn color(&self) -> Option<&str> {
        match self {
            Roi::Rectangle { color, .. } | Roi::Polygon { color, .. } => color.as_deref(),
        }
    }
}

/// Configuración con nombre: imagen de fondo más la lista ordenada de ROIs.
/// Se lee y se guarda completa; las ediciones son locales hasta guardar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoiConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub rois: Vec<Roi>,
}

/// Mapa nombre → configuración tal como lo sirve `/api/roi-configs`.
/// BTreeMap para que los selectores salgan siempre en el mismo orden.
pub type RoiConfigMap = BTreeMap<String, RoiConfig>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_roundtrips_through_wire_format() {
        let roi = Roi::rectangle(10.0, 20.0, 110.0, 80.0, "#28a745");
        let json = serde_json::to_string(&roi).unwrap();
        assert!(json.contains(r#""type":"rectangle""#));
        let back: Roi = serde_json::from_str(&json).unwrap();
        assert_eq!(back, roi);
    }

    #[test]
    fn polygon_bounds_and_containment() {
        let roi = Roi::Polygon {
            points: vec![[0.0, 0.0], [100.0, 0.0], [50.0, 60.0]],
            color: None,
        };
        assert_eq!(roi.bounds(), (0.0, 0.0, 100.0, 60.0));
        assert!(roi.contains(50.0, 30.0));
        assert!(!roi.contains(120.0, 30.0));
    }

    #[test]
    fn normalized_reorders_corners() {
        let roi = Roi::rectangle(110.0, 80.0, 10.0, 20.0, "#007bff").normalized();
        assert_eq!(roi.bounds(), (10.0, 20.0, 110.0, 80.0));
        match roi {
            Roi::Rectangle { x1, y1, .. } => {
                assert_eq!((x1, y1), (10.0, 20.0));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn translate_moves_every_point() {
        let mut roi = Roi::rectangle(0.0, 0.0, 10.0, 10.0, "#dc3545");
        roi.translate(5.0, -2.0);
        assert_eq!(roi.bounds(), (5.0, -2.0, 15.0, 8.0));
    }

    #[test]
    fn palette_wraps_around() {
        assert_eq!(palette_color(0), palette_color(ROI_PALETTE.len()));
    }
}
