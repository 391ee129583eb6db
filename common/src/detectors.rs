use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::config::SparkConf;
use crate::eventlog::StageId;
use crate::metrics::StageMetrics;

/* --------- Umbrales de los detectores --------- */

/// Con menos de 10 tareas el skew de percentiles no es significativo.
pub const SKEW_MIN_TASKS: i64 = 10;
pub const SKEW_P95_P50_WARN: f64 = 3.0;
pub const SKEW_MAX_P50_WARN: f64 = 8.0;
pub const SHUFFLE_MB_WARN: f64 = 1024.0;
pub const SPILL_MB_WARN: f64 = 512.0;
pub const GC_PCT_WARN: f64 = 0.10;

/* --------- Tipos de hallazgo --------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Rango para ordenar recomendaciones: ERROR primero.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Error => 0,
            Severity::Warn => 1,
            Severity::Info => 2,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Enumeración cerrada de códigos de hallazgo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingCode {
    SkewDetected,
    ShuffleHeavy,
    SpillDetected,
    GcPressure,
    OverPartitioned,
    UnderPartitioned,
    LowDefaultParallelism,
}

impl fmt::Display for FindingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FindingCode::SkewDetected => "SKEW_DETECTED",
            FindingCode::ShuffleHeavy => "SHUFFLE_HEAVY",
            FindingCode::SpillDetected => "SPILL_DETECTED",
            FindingCode::GcPressure => "GC_PRESSURE",
            FindingCode::OverPartitioned => "OVER_PARTITIONED",
            FindingCode::UnderPartitioned => "UNDER_PARTITIONED",
            FindingCode::LowDefaultParallelism => "LOW_DEFAULT_PARALLELISM",
        };
        f.write_str(s)
    }
}

/// Mapa métrica → valor que justifica el hallazgo.
pub type Evidence = serde_json::Map<String, Value>;

/// Observación de un detector. Inmutable; cada llamada a un detector crea
/// los suyos y nunca se fusionan entre detectores (un mismo stage puede
/// tener SKEW y SPILL a la vez).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub code: FindingCode,
    pub severity: Severity,
    /// None para hallazgos a nivel de cluster
    pub stage_id: Option<StageId>,
    pub message: String,
    pub evidence: Evidence,
}

fn evidence_of(value: Value) -> Evidence {
    value.as_object().cloned().unwrap_or_default()
}

/* --------- Detectores (funciones puras, sin estado) --------- */

/// Skew: dispara con p95/p50 ≥ 3 **o** max/p50 ≥ 8 (disyunción).
/// Escala a ERROR cuando max/p50 ≥ 16 (el doble del umbral WARN).
pub fn detect_skew(stages: &[StageMetrics]) -> Vec<Finding> {
    let mut out = Vec::new();
    for s in stages {
        if s.num_tasks < SKEW_MIN_TASKS {
            continue;
        }
        if s.skew_ratio_p95_p50 >= SKEW_P95_P50_WARN || s.skew_ratio_max_p50 >= SKEW_MAX_P50_WARN {
            let severity = if s.skew_ratio_max_p50 >= SKEW_MAX_P50_WARN * 2.0 {
                Severity::Error
            } else {
                Severity::Warn
            };
            out.push(Finding {
                code: FindingCode::SkewDetected,
                severity,
                stage_id: Some(s.stage_id),
                message: format!(
                    "El stage {} muestra skew de tareas (p95/p50={:.2}, max/p50={:.2}).",
                    s.stage_id, s.skew_ratio_p95_p50, s.skew_ratio_max_p50
                ),
                evidence: evidence_of(json!({
                    "p95_p50": s.skew_ratio_p95_p50,
                    "max_p50": s.skew_ratio_max_p50,
                    "p50_ms": s.task_p50_ms,
                    "p95_ms": s.task_p95_ms,
                    "max_ms": s.task_max_ms,
                })),
            });
        }
    }
    out
}

/// Shuffle pesado: lectura + escritura ≥ 1024 MB; ERROR desde 5× (5120 MB).
pub fn detect_shuffle_heavy(stages: &[StageMetrics]) -> Vec<Finding> {
    let mut out = Vec::new();
    for s in stages {
        let total = s.shuffle_read_mb + s.shuffle_write_mb;
        if total >= SHUFFLE_MB_WARN {
            let severity = if total >= SHUFFLE_MB_WARN * 5.0 {
                Severity::Error
            } else {
                Severity::Warn
            };
            out.push(Finding {
                code: FindingCode::ShuffleHeavy,
                severity,
                stage_id: Some(s.stage_id),
                message: format!(
                    "El stage {} mueve mucho shuffle (~{:.0} MB de I/O).",
                    s.stage_id, total
                ),
                evidence: evidence_of(json!({
                    "shuffle_read_mb": s.shuffle_read_mb,
                    "shuffle_write_mb": s.shuffle_write_mb,
                    "spill_mb": s.spill_mb,
                })),
            });
        }
    }
    out
}

/// Spill y presión de GC: dos condiciones independientes por stage, un
/// mismo stage puede emitir ambas. Spill ERROR desde 5× (2560 MB);
/// GC ERROR desde 2× (20 %).
pub fn detect_spill_or_gc(stages: &[StageMetrics]) -> Vec<Finding> {
    let mut out = Vec::new();
    for s in stages {
        if s.spill_mb >= SPILL_MB_WARN {
            let severity = if s.spill_mb < SPILL_MB_WARN * 5.0 {
                Severity::Warn
            } else {
                Severity::Error
            };
            out.push(Finding {
                code: FindingCode::SpillDetected,
                severity,
                stage_id: Some(s.stage_id),
                message: format!(
                    "El stage {} derramó ~{:.0} MB a disco: presión de memoria.",
                    s.stage_id, s.spill_mb
                ),
                evidence: evidence_of(json!({ "spill_mb": s.spill_mb })),
            });
        }
        if s.gc_pct >= GC_PCT_WARN {
            let severity = if s.gc_pct < GC_PCT_WARN * 2.0 {
                Severity::Warn
            } else {
                Severity::Error
            };
            out.push(Finding {
                code: FindingCode::GcPressure,
                severity,
                stage_id: Some(s.stage_id),
                message: format!(
                    "El stage {} gastó {:.1}% del tiempo de tareas en GC.",
                    s.stage_id,
                    s.gc_pct * 100.0
                ),
                evidence: evidence_of(json!({ "gc_pct": s.gc_pct })),
            });
        }
    }
    out
}

/// Particionado: hallazgos a nivel de cluster (stage_id = None). Solo
/// corre cuando hay un total de cores positivo. OVER y UNDER comparan el
/// mismo valor de shuffle.partitions y no son excluyentes por construcción
/// con clusters muy chicos; se deja tal cual.
pub fn detect_partitioning_issues(conf: &SparkConf, cores_total: Option<i64>) -> Vec<Finding> {
    let mut out = Vec::new();
    let cores = match cores_total {
        Some(c) if c > 0 => c,
        _ => return out,
    };

    let shuffle_parts = conf.get_int("spark.sql.shuffle.partitions", 200);
    let default_par = conf.get_int("spark.default.parallelism", 0);
    let low_floor = 8.max(cores / 4);

    if shuffle_parts >= cores * 20 {
        out.push(Finding {
            code: FindingCode::OverPartitioned,
            severity: Severity::Warn,
            stage_id: None,
            message: format!(
                "spark.sql.shuffle.partitions={} es altísimo para {} cores totales.",
                shuffle_parts, cores
            ),
            evidence: evidence_of(json!({
                "shuffle_partitions": shuffle_parts,
                "cores_total": cores,
            })),
        });
    }
    if shuffle_parts <= low_floor {
        out.push(Finding {
            code: FindingCode::UnderPartitioned,
            severity: Severity::Warn,
            stage_id: None,
            message: format!(
                "spark.sql.shuffle.partitions={} puede quedarse corto para {} cores totales.",
                shuffle_parts, cores
            ),
            evidence: evidence_of(json!({
                "shuffle_partitions": shuffle_parts,
                "cores_total": cores,
            })),
        });
    }
    // Solo si está seteado (≠ 0): el default de Spark depende del cluster
    if default_par != 0 && default_par <= low_floor {
        out.push(Finding {
            code: FindingCode::LowDefaultParallelism,
            severity: Severity::Info,
            stage_id: None,
            message: format!(
                "spark.default.parallelism={} puede ser bajo para {} cores.",
                default_par, cores
            ),
            evidence: evidence_of(json!({
                "default_parallelism": default_par,
                "cores_total": cores,
            })),
        });
    }
    out
}

/// Corre los cuatro detectores en orden fijo y concatena sus hallazgos.
/// Los detectores son independientes entre sí; este orden solo fija los
/// desempates del ordenamiento estable del sintetizador.
pub fn run_detectors(
    stages: &[StageMetrics],
    conf: &SparkConf,
    cores_total: Option<i64>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    findings.extend(detect_skew(stages));
    findings.extend(detect_shuffle_heavy(stages));
    findings.extend(detect_spill_or_gc(stages));
    findings.extend(detect_partitioning_issues(conf, cores_total));
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn base_metrics(stage_id: StageId) -> StageMetrics {
        StageMetrics {
            stage_id,
            attempt: 0,
            name: format!("stage-{stage_id}"),
            num_tasks: 200,
            stage_duration_ms: 1000,
            task_p50_ms: 100.0,
            task_p95_ms: 120.0,
            task_max_ms: 200,
            skew_ratio_p95_p50: 1.2,
            skew_ratio_max_p50: 2.0,
            gc_pct: 0.01,
            shuffle_read_mb: 0.0,
            shuffle_write_mb: 0.0,
            spill_mb: 0.0,
        }
    }

    fn conf_with(pairs: &[(&str, serde_json::Value)]) -> SparkConf {
        SparkConf::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    /// Escenario de referencia: 200 tareas, p50=100, p95=500, max=2000
    /// → ratios (5.0, 20.0) → SKEW_DETECTED con severidad ERROR.
    #[test]
    fn skew_detector_triggers_with_error_severity() {
        let mut s = base_metrics(1);
        s.task_p95_ms = 500.0;
        s.task_max_ms = 2000;
        s.skew_ratio_p95_p50 = 5.0;
        s.skew_ratio_max_p50 = 20.0;

        let findings = detect_skew(&[s]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, FindingCode::SkewDetected);
        assert_eq!(findings[0].severity, Severity::Error);
        assert_eq!(findings[0].stage_id, Some(1));
        assert_eq!(findings[0].evidence["max_p50"], json!(20.0));
    }

    /// Con menos de 10 tareas nunca hay hallazgo de skew, por extremos
    /// que sean los ratios.
    #[test]
    fn skew_detector_ignores_small_stages() {
        let mut s = base_metrics(1);
        s.num_tasks = 9;
        s.skew_ratio_p95_p50 = 1000.0;
        s.skew_ratio_max_p50 = 1000.0;
        assert!(detect_skew(&[s]).is_empty());
    }

    /// Cualquiera de los dos umbrales alcanza (disyunción): p95/p50 alto
    /// con max/p50 bajo igual dispara, en WARN.
    #[test]
    fn skew_thresholds_are_a_disjunction() {
        let mut s = base_metrics(1);
        s.skew_ratio_p95_p50 = 3.0;
        s.skew_ratio_max_p50 = 4.0;
        let findings = detect_skew(&[s]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warn);
    }

    /// Frontera de escalamiento: max/p50 = 16.0 exacto es ERROR,
    /// 15.999 queda en WARN.
    #[test]
    fn skew_severity_boundary_at_sixteen() {
        let mut error_case = base_metrics(1);
        error_case.skew_ratio_max_p50 = 16.0;
        let mut warn_case = base_metrics(2);
        warn_case.skew_ratio_max_p50 = 15.999;

        let findings = detect_skew(&[error_case, warn_case]);
        assert_eq!(findings[0].severity, Severity::Error);
        assert_eq!(findings[1].severity, Severity::Warn);
    }

    /// 5000 MB leídos + 3000 escritos = 8000 ≥ 5120 → SHUFFLE_HEAVY ERROR.
    #[test]
    fn shuffle_heavy_escalates_to_error() {
        let mut s = base_metrics(2);
        s.shuffle_read_mb = 5000.0;
        s.shuffle_write_mb = 3000.0;
        let findings = detect_shuffle_heavy(&[s]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, FindingCode::ShuffleHeavy);
        assert_eq!(findings[0].severity, Severity::Error);
    }

    /// Justo en el umbral de 1024 MB dispara en WARN; por debajo, nada.
    #[test]
    fn shuffle_heavy_warn_threshold() {
        let mut warm = base_metrics(1);
        warm.shuffle_read_mb = 1024.0;
        let mut cold = base_metrics(2);
        cold.shuffle_read_mb = 1023.9;
        let findings = detect_shuffle_heavy(&[warm, cold]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warn);
    }

    /// Spill y GC son condiciones independientes: un mismo stage puede
    /// emitir SPILL_DETECTED y GC_PRESSURE a la vez.
    #[test]
    fn spill_and_gc_can_fire_together() {
        let mut s = base_metrics(3);
        s.spill_mb = 600.0;
        s.gc_pct = 0.15;
        let findings = detect_spill_or_gc(&[s]);
        let codes: Vec<FindingCode> = findings.iter().map(|f| f.code).collect();
        assert_eq!(
            codes,
            vec![FindingCode::SpillDetected, FindingCode::GcPressure]
        );
        assert!(findings.iter().all(|f| f.severity == Severity::Warn));
    }

    /// Escalamiento de spill (≥ 2560 MB) y de GC (≥ 0.20) a ERROR.
    #[test]
    fn spill_and_gc_error_escalation() {
        let mut s = base_metrics(3);
        s.spill_mb = 2560.0;
        s.gc_pct = 0.20;
        let findings = detect_spill_or_gc(&[s]);
        assert!(findings.iter().all(|f| f.severity == Severity::Error));
    }

    /// Escenario de referencia: partitions=200 con 10 cores → dispara
    /// OVER (200 ≥ 200) pero no UNDER (200 > max(8, 2)).
    #[test]
    fn partitioning_over_but_not_under_with_ten_cores() {
        let conf = conf_with(&[("spark.sql.shuffle.partitions", json!(200))]);
        let findings = detect_partitioning_issues(&conf, Some(10));
        let codes: Vec<FindingCode> = findings.iter().map(|f| f.code).collect();
        assert_eq!(codes, vec![FindingCode::OverPartitioned]);
        assert_eq!(findings[0].stage_id, None);
    }

    /// UNDER usa el piso max(8, cores/4).
    #[test]
    fn partitioning_under_with_low_partitions() {
        let conf = conf_with(&[("spark.sql.shuffle.partitions", json!(8))]);
        let findings = detect_partitioning_issues(&conf, Some(100));
        let codes: Vec<FindingCode> = findings.iter().map(|f| f.code).collect();
        // piso = max(8, 25) = 25; 8 ≤ 25 → UNDER, y 8 < 2000 → sin OVER
        assert_eq!(codes, vec![FindingCode::UnderPartitioned]);
    }

    /// Sin total de cores (o con 0) el detector no corre.
    #[test]
    fn partitioning_requires_positive_cores() {
        let conf = SparkConf::default();
        assert!(detect_partitioning_issues(&conf, None).is_empty());
        assert!(detect_partitioning_issues(&conf, Some(0)).is_empty());
    }

    /// LOW_DEFAULT_PARALLELISM solo cuando está seteado (≠ 0) y es bajo.
    #[test]
    fn low_default_parallelism_only_when_set() {
        // No seteado: el default 0 no cuenta como "bajo"
        let unset = conf_with(&[("spark.sql.shuffle.partitions", json!(64))]);
        let findings = detect_partitioning_issues(&unset, Some(16));
        assert!(findings
            .iter()
            .all(|f| f.code != FindingCode::LowDefaultParallelism));

        // Seteado en 4 con 16 cores: 4 ≤ max(8, 4) → INFO
        let set = conf_with(&[
            ("spark.sql.shuffle.partitions", json!(64)),
            ("spark.default.parallelism", json!(4)),
        ]);
        let findings = detect_partitioning_issues(&set, Some(16));
        let low = findings
            .iter()
            .find(|f| f.code == FindingCode::LowDefaultParallelism)
            .unwrap();
        assert_eq!(low.severity, Severity::Info);
    }

    /// Sin configuración, shuffle.partitions asume el default 200.
    #[test]
    fn partitioning_uses_spark_defaults() {
        let conf = SparkConf::new(HashMap::new());
        // 200 >= 20 * 4 → OVER con el default
        let findings = detect_partitioning_issues(&conf, Some(4));
        assert!(findings
            .iter()
            .any(|f| f.code == FindingCode::OverPartitioned));
    }

    /// run_detectors concatena en orden fijo: skew, shuffle, spill/gc,
    /// particionado.
    #[test]
    fn run_detectors_concatenates_in_fixed_order() {
        let mut s = base_metrics(1);
        s.skew_ratio_max_p50 = 20.0;
        s.shuffle_read_mb = 2000.0;
        s.spill_mb = 600.0;
        let conf = conf_with(&[("spark.sql.shuffle.partitions", json!(400))]);

        let findings = run_detectors(&[s], &conf, Some(10));
        let codes: Vec<FindingCode> = findings.iter().map(|f| f.code).collect();
        assert_eq!(
            codes,
            vec![
                FindingCode::SkewDetected,
                FindingCode::ShuffleHeavy,
                FindingCode::SpillDetected,
                FindingCode::OverPartitioned,
            ]
        );
    }

    /// Severity serializa en SCREAMING_SNAKE_CASE y ordena INFO<WARN<ERROR.
    #[test]
    fn severity_serde_and_order() {
        assert_eq!(serde_json::to_string(&Severity::Error).unwrap(), "\"ERROR\"");
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
        assert_eq!(Severity::Error.rank(), 0);
        assert_eq!(
            serde_json::to_string(&FindingCode::SkewDetected).unwrap(),
            "\"SKEW_DETECTED\""
        );
    }
}
