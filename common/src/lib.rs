/* --------- Pipeline de análisis de event logs de Spark ---------
   El flujo es estrictamente hacia adelante:
   líneas crudas → registros tipados → métricas por stage → hallazgos
   → recomendaciones. Ningún módulo depende de uno posterior. */

pub mod config;
pub mod cost;
pub mod detectors;
pub mod eventlog;
pub mod metrics;
pub mod recommend;
pub mod report;

pub use config::{ClusterSpec, SparkConf};
pub use cost::{compare, estimate_cost, CostComparison, CostEstimate};
pub use detectors::{
    detect_partitioning_issues, detect_shuffle_heavy, detect_skew, detect_spill_or_gc,
    run_detectors, Evidence, Finding, FindingCode, Severity,
};
pub use eventlog::{parse_eventlog, parse_eventlog_reader, AppMeta, StageCompleted, StageId, TaskEnd};
pub use metrics::{build_stage_metrics, metrics_table, write_metrics_csv, StageMetrics};
pub use recommend::{recommend, Recommendation};
pub use report::generate_markdown_report;
