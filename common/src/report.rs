use anyhow::{Context, Result};
use chrono::Utc;
use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use crate::config::SparkConf;
use crate::detectors::run_detectors;
use crate::eventlog::parse_eventlog;
use crate::metrics::{build_stage_metrics, StageMetrics};
use crate::recommend::recommend;

const REPORT_TOP_STAGES: usize = 10;

fn stage_table_rows(out: &mut String, top: &[StageMetrics]) {
    out.push_str(
        "| Stage | Duración (ms) | Tareas | p50 (ms) | p95 (ms) | max (ms) | Shuffle (MB) | Spill (MB) | GC % |\n",
    );
    out.push_str("|---:|---:|---:|---:|---:|---:|---:|---:|---:|\n");
    for m in top {
        let shuffle = m.shuffle_read_mb + m.shuffle_write_mb;
        writeln!(
            out,
            "| {} | {} | {} | {:.0} | {:.0} | {} | {:.0} | {:.0} | {:.1}% |",
            m.stage_id,
            m.stage_duration_ms,
            m.num_tasks,
            m.task_p50_ms,
            m.task_p95_ms,
            m.task_max_ms,
            shuffle,
            m.spill_mb,
            m.gc_pct * 100.0
        )
        .unwrap();
    }
}

/// Corre el pipeline completo sobre un event log y escribe el informe
/// Markdown en `out_path` (creando los directorios intermedios).
/// Devuelve la ruta escrita.
pub fn generate_markdown_report<P, Q>(
    eventlog_path: P,
    conf: &SparkConf,
    out_path: Q,
    cores_total: Option<i64>,
) -> Result<PathBuf>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let eventlog_path = eventlog_path.as_ref();
    let out_path = out_path.as_ref();

    let (stages, tasks, meta) = parse_eventlog(eventlog_path)?;
    let metrics = build_stage_metrics(&stages, &tasks);
    let findings = run_detectors(&metrics, conf, cores_total);
    let recs = recommend(&findings, conf);

    let mut out = String::new();
    out.push_str("# Informe de performance y costo de Spark\n\n");
    writeln!(out, "**Event log:** `{}`", eventlog_path.display()).unwrap();
    writeln!(out, "**App:** `{}`  \\", meta.app_name.as_deref().unwrap_or("?")).unwrap();
    writeln!(out, "**App ID:** `{}`  \\", meta.app_id.as_deref().unwrap_or("?")).unwrap();
    writeln!(out, "**Generado:** {}", Utc::now().to_rfc3339()).unwrap();

    out.push_str("\n## Stages más largos\n\n");
    if metrics.is_empty() {
        out.push_str("_No se encontraron métricas de stages en el event log._\n");
    } else {
        stage_table_rows(&mut out, &metrics[..metrics.len().min(REPORT_TOP_STAGES)]);
    }

    out.push_str("\n## Hallazgos\n\n");
    if findings.is_empty() {
        out.push_str("Sin hallazgos significativos.\n");
    } else {
        for f in &findings {
            let sid = f
                .stage_id
                .map(|s| s.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            writeln!(
                out,
                "- **[{}] {}** (stage: {}) - {}",
                f.severity, f.code, sid, f.message
            )
            .unwrap();
        }
    }

    out.push_str("\n## Recomendaciones\n\n");
    if recs.is_empty() {
        out.push_str("No se generaron recomendaciones.\n");
    } else {
        for r in &recs {
            let sid = r
                .stage_id
                .map(|s| s.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            writeln!(out, "### {}  \\", r.title).unwrap();
            writeln!(out, "**Severidad:** {}  \\", r.severity).unwrap();
            writeln!(out, "**Stage:** {}\n", sid).unwrap();
            writeln!(out, "**Justificación:** {}\n", r.rationale).unwrap();
            out.push_str("**Acciones:**\n");
            for a in &r.actions {
                writeln!(out, "- {}", a).unwrap();
            }
            if let Some(ev) = &r.evidence {
                out.push_str("\n<details><summary>Evidencia</summary>\n\n```json\n");
                out.push_str(&serde_json::to_string_pretty(ev)?);
                out.push_str("\n```\n</details>\n");
            }
            out.push('\n');
        }
    }

    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("no se pudo crear {}", parent.display()))?;
        }
    }
    fs::write(out_path, out)
        .with_context(|| format!("no se pudo escribir el informe {}", out_path.display()))?;
    Ok(out_path.to_path_buf())
}
