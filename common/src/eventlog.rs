use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

pub type StageId = i64;

/* --------- Registros tipados que salen del event log --------- */

/// Un intento de tarea terminado (evento SparkListenerTaskEnd).
/// Inmutable una vez parseado; solo lo consume el agregador de métricas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnd {
    pub stage_id: StageId,
    pub attempt: i64,
    pub task_id: i64,
    pub duration_ms: i64,
    pub gc_time_ms: i64,
    pub shuffle_read_bytes: i64,
    pub shuffle_write_bytes: i64,
    pub spill_mem_bytes: i64,
    pub spill_disk_bytes: i64,
}

/// Un intento de stage terminado (evento SparkListenerStageCompleted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCompleted {
    pub stage_id: StageId,
    pub attempt: i64,
    pub name: String,
    pub num_tasks: i64,
    /// Timestamps en ms de época; pueden faltar en logs truncados.
    pub submission_time_ms: Option<i64>,
    pub completion_time_ms: Option<i64>,
}

/// Metadatos de la aplicación (evento SparkListenerApplicationStart).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppMeta {
    pub app_id: Option<String>,
    pub app_name: Option<String>,
}

/* --------- Lectura tolerante de campos --------- */

// El formato del event log renombró varios campos entre versiones
// ("Stage ID" vs "Stage Id"). Cada campo lógico tiene una lista de
// alias aceptados, probados en orden de prioridad.
fn field_value<'a>(obj: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    for key in aliases {
        match obj.get(*key) {
            Some(Value::Null) | None => continue,
            Some(v) => return Some(v),
        }
    }
    None
}

fn field_i64(obj: &Value, aliases: &[&str], default: i64) -> i64 {
    field_opt_i64(obj, aliases).unwrap_or(default)
}

fn field_opt_i64(obj: &Value, aliases: &[&str]) -> Option<i64> {
    field_value(obj, aliases).and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
}

fn field_str(obj: &Value, aliases: &[&str]) -> Option<String> {
    field_value(obj, aliases)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/* --------- Parser del event log --------- */

fn on_stage_completed(evt: &Value, stages: &mut Vec<StageCompleted>) {
    // El detalle del stage viene anidado en "Stage Info"
    let empty = Value::Null;
    let info = evt.get("Stage Info").unwrap_or(&empty);
    stages.push(StageCompleted {
        stage_id: field_i64(info, &["Stage ID", "Stage Id"], -1),
        attempt: field_i64(info, &["Stage Attempt ID", "Stage Attempt Id"], 0),
        name: field_str(info, &["Stage Name"]).unwrap_or_default(),
        num_tasks: field_i64(info, &["Number of Tasks"], 0),
        submission_time_ms: field_opt_i64(info, &["Submission Time"]),
        completion_time_ms: field_opt_i64(info, &["Completion Time"]),
    });
}

fn on_task_end(evt: &Value, tasks: &mut Vec<TaskEnd>) {
    let empty = Value::Null;
    let task_info = evt.get("Task Info").unwrap_or(&empty);
    let metrics = evt.get("Task Metrics").unwrap_or(&empty);
    let read_metrics = metrics.get("Shuffle Read Metrics").unwrap_or(&empty);
    let write_metrics = metrics.get("Shuffle Write Metrics").unwrap_or(&empty);

    // Lectura de shuffle = remota + local
    let shuffle_read = field_i64(read_metrics, &["Remote Bytes Read"], 0)
        + field_i64(read_metrics, &["Local Bytes Read"], 0);
    let shuffle_write = field_i64(write_metrics, &["Shuffle Bytes Written"], 0);

    // Duración: Finish - Launch si ambos timestamps existen; si no,
    // caemos al "Executor Run Time" reportado; si tampoco, 0.
    let launch = field_opt_i64(task_info, &["Launch Time"]);
    let finish = field_opt_i64(task_info, &["Finish Time"]);
    let duration = match (launch, finish) {
        (Some(l), Some(f)) => f - l,
        _ => field_i64(metrics, &["Executor Run Time"], 0),
    };

    tasks.push(TaskEnd {
        stage_id: field_i64(evt, &["Stage ID", "Stage Id"], -1),
        attempt: field_i64(evt, &["Stage Attempt ID", "Stage Attempt Id"], 0),
        task_id: field_i64(task_info, &["Task ID", "Task Id"], 0),
        // Relojes desfasados pueden dar duración negativa: se recorta a 0
        duration_ms: duration.max(0),
        gc_time_ms: field_i64(metrics, &["JVM GC Time"], 0),
        shuffle_read_bytes: shuffle_read,
        shuffle_write_bytes: shuffle_write,
        spill_mem_bytes: field_i64(metrics, &["Memory Bytes Spilled"], 0),
        spill_disk_bytes: field_i64(metrics, &["Disk Bytes Spilled"], 0),
    });
}

/// Parsea un event log JSONL desde cualquier lector con buffer.
///
/// Líneas en blanco y tipos de evento desconocidos se ignoran sin error.
/// Una línea que no decodifica como JSON aborta el parseo completo: las
/// estadísticas de etapas posteriores no tendrían sentido sobre un log
/// parcialmente leído.
pub fn parse_eventlog_reader<R: BufRead>(
    reader: R,
) -> Result<(Vec<StageCompleted>, Vec<TaskEnd>, AppMeta)> {
    let mut stages: Vec<StageCompleted> = Vec::new();
    let mut tasks: Vec<TaskEnd> = Vec::new();
    let mut meta = AppMeta::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("error leyendo la línea {}", idx + 1))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let evt: Value = serde_json::from_str(line)
            .with_context(|| format!("línea {} del event log no es JSON válido", idx + 1))?;

        match evt.get("Event").and_then(|v| v.as_str()) {
            Some("SparkListenerApplicationStart") => {
                meta.app_name = field_str(&evt, &["App Name"]);
                meta.app_id = field_str(&evt, &["App ID", "App Id"]);
            }
            Some("SparkListenerStageCompleted") => on_stage_completed(&evt, &mut stages),
            Some("SparkListenerTaskEnd") => on_task_end(&evt, &mut tasks),
            // Cualquier otro evento (executor added, job start, etc.) no aporta
            _ => {}
        }
    }

    Ok((stages, tasks, meta))
}

/// Parsea un event log JSONL desde un archivo en disco.
pub fn parse_eventlog<P: AsRef<Path>>(
    path: P,
) -> Result<(Vec<StageCompleted>, Vec<TaskEnd>, AppMeta)> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("no se pudo abrir el event log {}", path.display()))?;
    parse_eventlog_reader(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(lines: &str) -> (Vec<StageCompleted>, Vec<TaskEnd>, AppMeta) {
        parse_eventlog_reader(Cursor::new(lines.to_string())).unwrap()
    }

    /// Caso feliz: app start + stage + task con el esquema moderno.
    #[test]
    fn parses_app_stage_and_task_events() {
        let log = r#"
{"Event":"SparkListenerApplicationStart","App Name":"etl-diario","App ID":"app-123"}
{"Event":"SparkListenerStageCompleted","Stage Info":{"Stage ID":3,"Stage Attempt ID":0,"Stage Name":"shuffle at join","Number of Tasks":40,"Submission Time":1000,"Completion Time":5000}}
{"Event":"SparkListenerTaskEnd","Stage ID":3,"Stage Attempt ID":0,"Task Info":{"Task ID":7,"Launch Time":1100,"Finish Time":1600},"Task Metrics":{"JVM GC Time":20,"Memory Bytes Spilled":10,"Disk Bytes Spilled":5,"Shuffle Read Metrics":{"Remote Bytes Read":100,"Local Bytes Read":50},"Shuffle Write Metrics":{"Shuffle Bytes Written":70}}}
"#;
        let (stages, tasks, meta) = parse(log);

        assert_eq!(meta.app_id.as_deref(), Some("app-123"));
        assert_eq!(meta.app_name.as_deref(), Some("etl-diario"));

        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].stage_id, 3);
        assert_eq!(stages[0].num_tasks, 40);
        assert_eq!(stages[0].submission_time_ms, Some(1000));
        assert_eq!(stages[0].completion_time_ms, Some(5000));

        assert_eq!(tasks.len(), 1);
        let t = &tasks[0];
        assert_eq!(t.task_id, 7);
        assert_eq!(t.duration_ms, 500); // 1600 - 1100
        assert_eq!(t.gc_time_ms, 20);
        assert_eq!(t.shuffle_read_bytes, 150); // remota + local
        assert_eq!(t.shuffle_write_bytes, 70);
        assert_eq!(t.spill_mem_bytes, 10);
        assert_eq!(t.spill_disk_bytes, 5);
    }

    /// El formato viejo escribe "Stage Id" en vez de "Stage ID":
    /// ambos alias deben aceptarse.
    #[test]
    fn accepts_legacy_field_spellings() {
        let log = r#"
{"Event":"SparkListenerStageCompleted","Stage Info":{"Stage Id":9,"Stage Attempt Id":2,"Stage Name":"x","Number of Tasks":4}}
{"Event":"SparkListenerTaskEnd","Stage Id":9,"Stage Attempt Id":2,"Task Info":{"Task Id":1},"Task Metrics":{"Executor Run Time":321}}
"#;
        let (stages, tasks, _) = parse(log);
        assert_eq!(stages[0].stage_id, 9);
        assert_eq!(stages[0].attempt, 2);
        assert_eq!(tasks[0].stage_id, 9);
        assert_eq!(tasks[0].attempt, 2);
        assert_eq!(tasks[0].task_id, 1);
    }

    /// Sin timestamps de launch/finish, la duración cae a Executor Run Time.
    #[test]
    fn duration_falls_back_to_executor_run_time() {
        let log = r#"{"Event":"SparkListenerTaskEnd","Stage ID":1,"Task Info":{"Task ID":1,"Launch Time":500},"Task Metrics":{"Executor Run Time":250}}"#;
        let (_, tasks, _) = parse(log);
        // Falta "Finish Time", así que no se puede restar
        assert_eq!(tasks[0].duration_ms, 250);
    }

    /// Timestamps con null explícito cuentan como ausentes.
    #[test]
    fn null_timestamps_count_as_absent() {
        let log = r#"{"Event":"SparkListenerTaskEnd","Stage ID":1,"Task Info":{"Task ID":1,"Launch Time":null,"Finish Time":900},"Task Metrics":{"Executor Run Time":77}}"#;
        let (_, tasks, _) = parse(log);
        assert_eq!(tasks[0].duration_ms, 77);
    }

    /// Reloj desfasado: finish < launch se recorta a 0, nunca negativo.
    #[test]
    fn negative_duration_is_clamped_to_zero() {
        let log = r#"{"Event":"SparkListenerTaskEnd","Stage ID":1,"Task Info":{"Task ID":1,"Launch Time":2000,"Finish Time":1500},"Task Metrics":{}}"#;
        let (_, tasks, _) = parse(log);
        assert_eq!(tasks[0].duration_ms, 0);
    }

    /// Líneas en blanco y eventos desconocidos se saltan sin quejarse.
    #[test]
    fn skips_blank_lines_and_unknown_events() {
        let log = "\n\n{\"Event\":\"SparkListenerExecutorAdded\"}\n   \n{\"Event\":\"SparkListenerJobStart\",\"Job ID\":1}\n";
        let (stages, tasks, meta) = parse(log);
        assert!(stages.is_empty());
        assert!(tasks.is_empty());
        assert_eq!(meta, AppMeta::default());
    }

    /// Una línea que no es JSON aborta todo el parseo (sin resultados parciales).
    #[test]
    fn malformed_line_fails_the_whole_parse() {
        let log = "{\"Event\":\"SparkListenerStageCompleted\",\"Stage Info\":{\"Stage ID\":1}}\nesto no es json\n";
        let res = parse_eventlog_reader(Cursor::new(log.to_string()));
        assert!(res.is_err());
        let msg = format!("{:#}", res.unwrap_err());
        assert!(msg.contains("línea 2"));
    }

    /// Un archivo inexistente devuelve Err con la ruta en el contexto.
    #[test]
    fn missing_file_returns_error() {
        let res = parse_eventlog("/no/existe/eventlog.jsonl");
        assert!(res.is_err());
    }

    /// Métricas ausentes por completo: todos los contadores quedan en 0.
    #[test]
    fn missing_metrics_default_to_zero() {
        let log = r#"{"Event":"SparkListenerTaskEnd","Stage ID":2,"Task Info":{"Task ID":4}}"#;
        let (_, tasks, _) = parse(log);
        let t = &tasks[0];
        assert_eq!(t.duration_ms, 0);
        assert_eq!(t.gc_time_ms, 0);
        assert_eq!(t.shuffle_read_bytes, 0);
        assert_eq!(t.shuffle_write_bytes, 0);
        assert_eq!(t.spill_mem_bytes, 0);
        assert_eq!(t.spill_disk_bytes, 0);
    }
}
