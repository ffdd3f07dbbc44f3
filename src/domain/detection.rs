use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Una detección individual tal como la publica el servidor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionItem {
    pub class_name: String,
    /// Confianza en el rango 0..1.
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f32; 4]>,
    /// Índice del ROI que contiene la detección, cuando el servidor aplicó un ROI config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi_id: Option<usize>,
}

/// Cuenta detecciones por clase, en orden alfabético estable.
pub fn count_by_class(items: &[DetectionItem]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for item in items {
        *counts.entry(item.class_name.as_str()).or_insert(0) += 1;
    }
    let mut pairs: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(label, count)| (label.to_string(), count))
        .collect();
    pairs.sort();
    pairs
}

/// Resumen corto para la barra de estado, p. ej. "2 person, 1 car".
pub fn summarize(items: &[DetectionItem]) -> String {
    count_by_class(items)
        .iter()
        .map(|(label, count)| format!("{} {}", count, label))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Número de detecciones de `class_name` dentro del ROI `roi_id`.
/// Las detecciones sin `roi_id` no cuentan para ninguna regla.
pub fn count_in_roi(items: &[DetectionItem], roi_id: usize, class_name: &str) -> usize {
    items
        .iter()
        .filter(|d| d.roi_id == Some(roi_id) && d.class_name == class_name)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_name: &str, score: f32, roi_id: Option<usize>) -> DetectionItem {
        DetectionItem {
            class_name: class_name.to_string(),
            score,
            class_id: None,
            bbox: None,
            roi_id,
        }
    }

    #[test]
    fn summarize_counts_per_class() {
        let items = vec![
            det("person", 0.9, None),
            det("car", 0.8, None),
            det("person", 0.7, None),
        ];
        assert_eq!(summarize(&items), "1 car, 2 person");
    }

    #[test]
    fn count_in_roi_ignores_detections_outside() {
        let items = vec![
            det("person", 0.9, Some(0)),
            det("person", 0.8, Some(1)),
            det("person", 0.7, None),
        ];
        assert_eq!(count_in_roi(&items, 0, "person"), 1);
        assert_eq!(count_in_roi(&items, 1, "person"), 1);
        assert_eq!(count_in_roi(&items, 2, "person"), 0);
    }

    #[test]
    fn item_deserializes_without_optional_fields() {
        let item: DetectionItem =
            serde_json::from_str(r#"{"class_name":"person","score":0.87}"#).unwrap();
        assert_eq!(item.class_name, "person");
        assert_eq!(item.roi_id, None);
        assert_eq!(item.bbox, None);
    }
}
