use serde::{Deserialize, Serialize};

/// Registro de un modelo en el catálogo del servidor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub name: String,        // nombre lógico, único en el catálogo
    #[serde(rename = "type")]
    pub kind: String,        // "yolov5" | "yolov8"
    pub path: String,        // ruta del .onnx en el servidor
    #[serde(default)]
    pub description: String,
    /// Clases que el modelo puede detectar, en el orden del entrenamiento.
    #[serde(default)]
    pub classes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_field_keeps_wire_name() {
        let json = r#"{"name":"yolo8n","type":"yolov8","path":"models/yolo8n.onnx"}"#;
        let model: ModelRecord = serde_json::from_str(json).unwrap();
        assert_eq!(model.kind, "yolov8");
        assert!(model.classes.is_empty());

        let out = serde_json::to_value(&model).unwrap();
        assert_eq!(out["type"], "yolov8");
    }
}
