use serde::{Deserialize, Serialize};

use crate::config::SparkConf;
use crate::detectors::{Evidence, Finding, FindingCode, Severity};
use crate::eventlog::StageId;

/// Recomendación accionable sintetizada a partir de exactamente un
/// hallazgo (mapeo uno a uno, nunca se agregan varios hallazgos).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub severity: Severity,
    pub title: String,
    pub rationale: String,
    pub actions: Vec<String>,
    pub stage_id: Option<StageId>,
    pub evidence: Option<Evidence>,
}

fn template_for(f: &Finding, aqe_enabled: bool, skew_join_enabled: bool) -> Recommendation {
    let (title, rationale, actions): (&str, &str, Vec<String>) = match f.code {
        FindingCode::SkewDetected => {
            // Slots con nombre: cada acción sustituible es un binding
            // propio, elegido según los flags ya activos en la conf.
            let aqe_action = if aqe_enabled {
                "AQE ya está habilitado; validar que el plan aplique coalescing y manejo de skew."
            } else {
                "Habilitar AQE: spark.sql.adaptive.enabled=true."
            };
            let skew_join_action = if skew_join_enabled {
                "El manejo de skew join ya está habilitado; revisar umbrales y tamaño de particiones."
            } else {
                "Habilitar el manejo de skew join: spark.sql.adaptive.skewJoin.enabled=true."
            };
            (
                "Mitigar el skew de datos (tareas rezagadas)",
                "p95/max muy por encima de p50 implica skew: unas pocas tareas dominan el tiempo del stage.",
                vec![
                    "Identificar las claves con skew (join/groupBy): salting, pre-agregación o particionado consciente del skew.".to_string(),
                    aqe_action.to_string(),
                    skew_join_action.to_string(),
                    "Considerar broadcast join para el lado de dimensión chico (hint o ajuste del threshold).".to_string(),
                ],
            )
        }
        FindingCode::ShuffleHeavy => (
            "Reducir el I/O de shuffle (joins/agregaciones)",
            "Un shuffle grande de lectura/escritura suele dominar el runtime y disparar spill/GC.",
            vec![
                "Revisar la estrategia de join: broadcast para tablas chicas cuando se pueda.".to_string(),
                "Reparticionar por las claves del join antes de un join grande si los datos vienen mal distribuidos.".to_string(),
                "Preferir reduceByKey / combinaciones map-side sobre groupByKey donde aplique.".to_string(),
                "Habilitar AQE para coalescer particiones de shuffle (spark.sql.adaptive.enabled=true).".to_string(),
            ],
        ),
        FindingCode::SpillDetected => (
            "Reducir los spills (presión de memoria)",
            "El spill indica memoria insuficiente por tarea o particiones de shuffle demasiado grandes.",
            vec![
                "Aumentar la memoria del executor o achicar las particiones de shuffle para que entren en memoria.".to_string(),
                "Atacar el skew: las particiones con skew suelen ser las que derraman.".to_string(),
                "No cachear intermedios grandes salvo que se reúsen; hacer unpersist agresivo.".to_string(),
            ],
        ),
        FindingCode::GcPressure => (
            "Bajar el overhead de GC",
            "Un GC% alto sugiere asignación frecuente o filas grandes durante shuffle/agregación.",
            vec![
                "Aumentar la memoria del executor o ajustar la configuración de memoria (según plataforma).".to_string(),
                "Reducir filas anchas y evitar explotar estructuras anidadas sin necesidad.".to_string(),
                "Preferir expresiones de Spark SQL sobre UDFs de Python cuando se pueda.".to_string(),
            ],
        ),
        FindingCode::OverPartitioned => (
            "Reducir el sobre-particionado (overhead del scheduler)",
            "El exceso de particiones crea tareas diminutas y aumenta el overhead.",
            vec![
                "Bajar spark.sql.shuffle.partitions a ~2-4x el total de cores para la mayoría de los ETL.".to_string(),
                "Si AQE está habilitado, dejar shuffle.partitions moderado y confiar en el coalescing.".to_string(),
                "Hacer coalesce antes de escribir para no generar montones de archivos chicos.".to_string(),
            ],
        ),
        FindingCode::UnderPartitioned => (
            "Aumentar el paralelismo (sub-particionado)",
            "Muy pocas particiones subutilizan los executors y alargan cada tarea.",
            vec![
                "Subir spark.sql.shuffle.partitions a ~2-4x el total de cores para jobs con shuffle pesado.".to_string(),
                "Reparticionar por claves estables antes de operaciones anchas si el paralelismo sigue bajo.".to_string(),
            ],
        ),
        FindingCode::LowDefaultParallelism => (
            "Ajustar el paralelismo por defecto",
            "Un default parallelism bajo limita el throughput de jobs con mucho RDD.",
            vec![
                "Setear spark.default.parallelism a 2-3x el total de cores para cargas con mucho RDD.".to_string(),
                "Para Spark SQL, enfocarse en shuffle partitions + AQE.".to_string(),
            ],
        ),
    };

    Recommendation {
        severity: f.severity,
        title: title.to_string(),
        rationale: rationale.to_string(),
        actions,
        stage_id: f.stage_id,
        evidence: if f.evidence.is_empty() {
            None
        } else {
            Some(f.evidence.clone())
        },
    }
}

/// Sintetiza una recomendación por hallazgo y las ordena por
/// (severidad, stage): ERROR primero y, dentro de cada severidad, los
/// hallazgos de cluster (sin stage) al final. El orden es estable, así
/// que los empates conservan el orden de emisión de los detectores.
pub fn recommend(findings: &[Finding], conf: &SparkConf) -> Vec<Recommendation> {
    let aqe_enabled = conf.get_bool("spark.sql.adaptive.enabled", false);
    let skew_join_enabled = conf.get_bool("spark.sql.adaptive.skewJoin.enabled", false);

    let mut recs: Vec<Recommendation> = findings
        .iter()
        .map(|f| template_for(f, aqe_enabled, skew_join_enabled))
        .collect();

    recs.sort_by_key(|r| (r.severity.rank(), r.stage_id.unwrap_or(StageId::MAX)));
    recs
}
