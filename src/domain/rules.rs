use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Operador de comparación de una regla, serializado con el símbolo textual
/// que espera el servidor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOperator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

impl CmpOperator {
    pub const ALL: [CmpOperator; 6] = [
        CmpOperator::Eq,
        CmpOperator::Ne,
        CmpOperator::Gt,
        CmpOperator::Lt,
        CmpOperator::Ge,
        CmpOperator::Le,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOperator::Eq => "==",
            CmpOperator::Ne => "!=",
            CmpOperator::Gt => ">",
            CmpOperator::Lt => "<",
            CmpOperator::Ge => ">=",
            CmpOperator::Le => "<=",
        }
    }
}

impl fmt::Display for CmpOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "La clase C dentro del ROI R cumple OP N". El `roi_id` es el índice del
/// ROI dentro de la configuración referida, por lo que reordenar esa lista
/// invalida la regla.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicRule {
    pub roi_id: usize,
    #[serde(rename = "class")]
    pub class_name: String,
    pub operator: CmpOperator,
    pub count: u32,
}

impl LogicRule {
    /// Etiqueta legible para la tabla de reglas; los ROI se muestran desde 1.
    pub fn describe(&self) -> String {
        format!(
            "ROI {} · {} {} {}",
            self.roi_id + 1,
            self.class_name,
            self.operator,
            self.count
        )
    }
}

/// Configuración de reglas con nombre: referencia exactamente un ROI config
/// y un modelo, más la lista ordenada de reglas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub roi_config: String,
    pub model: String,
    #[serde(default)]
    pub rules: Vec<LogicRule>,
}

/// Mapa nombre → configuración tal como viaja en `/api/logic-rules`.
pub type RuleConfigMap = BTreeMap<String, RuleConfig>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_serialize_as_symbols() {
        for op in CmpOperator::ALL {
            let json = serde_json::to_string(&op).unwrap();
            assert_eq!(json, format!("\"{}\"", op.as_str()));
            let back: CmpOperator = serde_json::from_str(&json).unwrap();
            assert_eq!(back, op);
        }
    }

    #[test]
    fn rule_keeps_wire_field_names() {
        let rule = LogicRule {
            roi_id: 2,
            class_name: "person".to_string(),
            operator: CmpOperator::Ge,
            count: 1,
        };
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["class"], "person");
        assert_eq!(value["operator"], ">=");
        assert_eq!(rule.describe(), "ROI 3 · person >= 1");
    }
}
