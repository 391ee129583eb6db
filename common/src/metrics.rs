use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt::Write as _, path::Path};

use crate::eventlog::{StageCompleted, StageId, TaskEnd};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/* --------- Métricas derivadas por stage --------- */

/// Métricas agregadas de un intento de stage. Se calculan una sola vez
/// y los detectores las leen sin mutarlas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMetrics {
    pub stage_id: StageId,
    pub attempt: i64,
    pub name: String,
    pub num_tasks: i64,
    pub stage_duration_ms: i64,
    pub task_p50_ms: f64,
    pub task_p95_ms: f64,
    pub task_max_ms: i64,
    /// Ratios de skew; 0 cuando p50 es 0 (stage degenerado, no un error)
    pub skew_ratio_p95_p50: f64,
    pub skew_ratio_max_p50: f64,
    /// Fracción del tiempo total de tareas gastado en GC (0..1)
    pub gc_pct: f64,
    pub shuffle_read_mb: f64,
    pub shuffle_write_mb: f64,
    pub spill_mb: f64,
}

/// Percentil con interpolación lineal sobre la lista ordenada.
/// Lista vacía → 0.0.
fn percentile(values: &[i64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<i64> = values.to_vec();
    sorted.sort_unstable();

    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo] as f64;
    }
    let frac = rank - lo as f64;
    sorted[lo] as f64 + (sorted[hi] - sorted[lo]) as f64 * frac
}

/// Agrega las tareas por (stage, intento) y deriva las métricas de cada
/// stage completado. El resultado queda ordenado por duración de stage
/// descendente (orden estable: empates conservan el orden del log).
///
/// Un stage sin tareas en el log es válido: todas sus métricas quedan en 0.
pub fn build_stage_metrics(stages: &[StageCompleted], tasks: &[TaskEnd]) -> Vec<StageMetrics> {
    let mut by_stage: HashMap<(StageId, i64), Vec<&TaskEnd>> = HashMap::new();
    for t in tasks {
        by_stage.entry((t.stage_id, t.attempt)).or_default().push(t);
    }

    let empty: Vec<&TaskEnd> = Vec::new();
    let mut out: Vec<StageMetrics> = Vec::new();

    for s in stages {
        let ts = by_stage.get(&(s.stage_id, s.attempt)).unwrap_or(&empty);
        let durations: Vec<i64> = ts.iter().map(|t| t.duration_ms).collect();

        let p50 = percentile(&durations, 50.0);
        let p95 = percentile(&durations, 95.0);
        let max = durations.iter().copied().max().unwrap_or(0);

        let gc_total: i64 = ts.iter().map(|t| t.gc_time_ms).sum();
        // Denominador con piso en 1 para no dividir por cero
        let run_total: i64 = durations.iter().sum::<i64>().max(1);
        let gc_pct = gc_total as f64 / run_total as f64;

        let shuffle_read_mb =
            ts.iter().map(|t| t.shuffle_read_bytes).sum::<i64>() as f64 / BYTES_PER_MB;
        let shuffle_write_mb =
            ts.iter().map(|t| t.shuffle_write_bytes).sum::<i64>() as f64 / BYTES_PER_MB;
        let spill_mb = ts
            .iter()
            .map(|t| t.spill_mem_bytes + t.spill_disk_bytes)
            .sum::<i64>() as f64
            / BYTES_PER_MB;

        // Duración del stage: timestamps si el log los trae, si no la
        // tarea más larga como aproximación
        let stage_duration_ms = match (s.submission_time_ms, s.completion_time_ms) {
            (Some(sub), Some(comp)) => (comp - sub).max(0),
            _ => max,
        };

        // División por p50 solo cuando p50 > 0; si no, ratio 0
        let skew_ratio_p95_p50 = if p50 > 0.0 { p95 / p50 } else { 0.0 };
        let skew_ratio_max_p50 = if p50 > 0.0 { max as f64 / p50 } else { 0.0 };

        out.push(StageMetrics {
            stage_id: s.stage_id,
            attempt: s.attempt,
            name: s.name.clone(),
            num_tasks: s.num_tasks,
            stage_duration_ms,
            task_p50_ms: p50,
            task_p95_ms: p95,
            task_max_ms: max,
            skew_ratio_p95_p50,
            skew_ratio_max_p50,
            gc_pct,
            shuffle_read_mb,
            shuffle_write_mb,
            spill_mb,
        });
    }

    // sort_by es estable: los empates conservan el orden de entrada
    out.sort_by(|a, b| b.stage_duration_ms.cmp(&a.stage_duration_ms));
    out
}

/* --------- Vistas tabulares --------- */

/// Tabla de texto alineada con los primeros `top` stages (ya vienen
/// ordenados por duración descendente).
pub fn metrics_table(metrics: &[StageMetrics], top: usize) -> String {
    let mut out = String::new();
    writeln!(
        out,
        "{:>6} {:>8} {:>13} {:>6} {:>9} {:>9} {:>9} {:>12} {:>10} {:>6}",
        "stage", "attempt", "duration_ms", "tasks", "p50_ms", "p95_ms", "max_ms", "shuffle_mb",
        "spill_mb", "gc_pct"
    )
    .unwrap();
    for m in metrics.iter().take(top) {
        writeln!(
            out,
            "{:>6} {:>8} {:>13} {:>6} {:>9.0} {:>9.0} {:>9} {:>12.0} {:>10.0} {:>5.1}%",
            m.stage_id,
            m.attempt,
            m.stage_duration_ms,
            m.num_tasks,
            m.task_p50_ms,
            m.task_p95_ms,
            m.task_max_ms,
            m.shuffle_read_mb + m.shuffle_write_mb,
            m.spill_mb,
            m.gc_pct * 100.0
        )
        .unwrap();
    }
    out
}

/// Exporta la tabla completa de métricas a CSV (una fila por stage).
pub fn write_metrics_csv<P: AsRef<Path>>(metrics: &[StageMetrics], path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("no se pudo crear el CSV {}", path.display()))?;
    for m in metrics {
        writer.serialize(m)?;
    }
    writer.flush()?;
    Ok(())
}
