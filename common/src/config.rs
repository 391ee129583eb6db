use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, fs, path::Path};

/* --------- Configuración del engine (spark-defaults / --conf) --------- */

/// Mapa plano clave → valor con la configuración del job tal como se
/// cargó del JSON. Los getters hacen coerción laxa: un valor presente
/// pero intipeable nunca es fatal, se reemplaza por el default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparkConf {
    pub conf: HashMap<String, Value>,
}

impl SparkConf {
    pub fn new(conf: HashMap<String, Value>) -> Self {
        Self { conf }
    }

    /// Carga la configuración desde un archivo JSON plano
    /// (ej: {"spark.sql.shuffle.partitions": "400"}).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("no se pudo leer la configuración {}", path.display()))?;
        let conf: HashMap<String, Value> = serde_json::from_str(&raw)
            .with_context(|| format!("configuración {} no es un objeto JSON", path.display()))?;
        Ok(Self { conf })
    }

    /// Entero con fallback: acepta números, floats (truncados), strings
    /// numéricos y booleanos; cualquier otra cosa devuelve `default`.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.conf.get(key) {
            None | Some(Value::Null) => default,
            Some(v) => v
                .as_i64()
                .or_else(|| v.as_f64().map(|f| f as i64))
                .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
                .or_else(|| v.as_bool().map(i64::from))
                .unwrap_or(default),
        }
    }

    /// Booleano con fallback: acepta bool nativo y los spellings
    /// habituales de Spark ("true"/"1"/"yes"/"y" y sus negativos).
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        let v = match self.conf.get(key) {
            None | Some(Value::Null) => return default,
            Some(v) => v,
        };
        if let Some(b) = v.as_bool() {
            return b;
        }
        let s = match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => true,
            "false" | "0" | "no" | "n" => false,
            _ => default,
        }
    }
}

/* --------- Forma del cluster --------- */

/// Nodos × cores por nodo; de acá sale el total de cores que usa el
/// detector de particionado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub nodes: u32,
    pub cores_per_node: u32,
    pub memory_gb_per_node: f64,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            nodes: 1,
            cores_per_node: 4,
            memory_gb_per_node: 16.0,
        }
    }
}

impl ClusterSpec {
    pub fn cores_total(&self) -> i64 {
        i64::from(self.nodes) * i64::from(self.cores_per_node)
    }
}
