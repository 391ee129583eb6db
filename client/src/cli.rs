use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{
    build_stage_metrics, estimate_cost, generate_markdown_report, metrics_table, parse_eventlog,
    recommend, run_detectors, write_metrics_csv, ClusterSpec, SparkConf,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "spark-opt")]
#[command(about = "Analiza event logs de Spark y sugiere ajustes de configuración")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Imprime las métricas de los stages más largos de un event log
    AnalyzeEventlog {
        /// Ruta al event log (JSONL)
        #[arg(long)]
        eventlog: String,

        /// Cuántos stages mostrar
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Si se pasa, exporta la tabla completa a este CSV
        #[arg(long)]
        csv_out: Option<String>,
    },

    /// Genera recomendaciones a partir del event log + configuración
    Recommend {
        #[arg(long)]
        eventlog: String,

        /// JSON plano con la configuración de Spark (opcional)
        #[arg(long)]
        spark_conf: Option<String>,

        #[arg(long, default_value_t = 10)]
        nodes: u32,

        #[arg(long, default_value_t = 4)]
        cores_per_node: u32,

        #[arg(long, default_value_t = 16.0)]
        memory_gb_per_node: f64,
    },

    /// Genera un informe Markdown completo
    Report {
        #[arg(long)]
        eventlog: String,

        #[arg(long)]
        spark_conf: Option<String>,

        #[arg(long, default_value_t = 10)]
        nodes: u32,

        #[arg(long, default_value_t = 4)]
        cores_per_node: u32,

        /// Ruta del Markdown de salida
        #[arg(long)]
        out: String,
    },

    /// Estima el costo de una corrida: runtime × nodos × tarifa
    Cost {
        #[arg(long)]
        runtime_seconds: i64,

        #[arg(long)]
        nodes: i64,

        #[arg(long, default_value_t = 0.0)]
        rate_per_node_hour: f64,

        #[arg(long, default_value_t = 0.0)]
        dbus_per_node: f64,

        #[arg(long, default_value_t = 0.0)]
        rate_per_dbu_hour: f64,
    },
}

/// Sin archivo de configuración, el análisis corre con la conf vacía
/// (los getters aplican los defaults de Spark).
fn load_conf(path: Option<&str>) -> Result<SparkConf> {
    match path {
        Some(p) => SparkConf::from_file(p),
        None => Ok(SparkConf::default()),
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::AnalyzeEventlog {
            eventlog,
            top,
            csv_out,
        } => {
            let (stages, tasks, meta) = parse_eventlog(&eventlog)?;
            info!(
                "parseados {} stages y {} tareas de {}",
                stages.len(),
                tasks.len(),
                eventlog
            );
            let metrics = build_stage_metrics(&stages, &tasks);

            if metrics.is_empty() {
                // Entrada vacía no es un error: solo no hay nada que mostrar
                println!("No se encontraron métricas de stages ni tareas en el event log.");
                return Ok(());
            }

            if let Some(name) = meta.app_name {
                println!("App: {}", name);
            }
            print!("{}", metrics_table(&metrics, top));

            if let Some(csv_path) = csv_out {
                write_metrics_csv(&metrics, &csv_path)?;
                info!("tabla de métricas exportada a {}", csv_path);
            }
        }

        Commands::Recommend {
            eventlog,
            spark_conf,
            nodes,
            cores_per_node,
            memory_gb_per_node,
        } => {
            let conf = load_conf(spark_conf.as_deref())?;
            let cluster = ClusterSpec {
                nodes,
                cores_per_node,
                memory_gb_per_node,
            };

            let (stages, tasks, _) = parse_eventlog(&eventlog)?;
            let metrics = build_stage_metrics(&stages, &tasks);
            let findings = run_detectors(&metrics, &conf, Some(cluster.cores_total()));
            info!("{} hallazgos sobre {} stages", findings.len(), metrics.len());

            let recs = recommend(&findings, &conf);
            println!("{}", serde_json::to_string_pretty(&recs)?);
        }

        Commands::Report {
            eventlog,
            spark_conf,
            nodes,
            cores_per_node,
            out,
        } => {
            let conf = load_conf(spark_conf.as_deref())?;
            let cores_total = i64::from(nodes) * i64::from(cores_per_node);
            let written = generate_markdown_report(&eventlog, &conf, &out, Some(cores_total))?;
            println!("Informe escrito en {}", written.display());
        }

        Commands::Cost {
            runtime_seconds,
            nodes,
            rate_per_node_hour,
            dbus_per_node,
            rate_per_dbu_hour,
        } => {
            let est = estimate_cost(
                runtime_seconds,
                nodes,
                rate_per_node_hour,
                dbus_per_node,
                rate_per_dbu_hour,
            );
            println!("{}", serde_json::to_string_pretty(&est)?);
        }
    }

    Ok(())
}
