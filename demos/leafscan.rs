use argh::FromArgs;
use leafscan::{
    DiagnosisEngine, EngineResult, KnowledgeBase, PipelineConfig, PipelineState, Preprocessor,
    RawImage, onnx::OnnxBackend,
};
use std::{path::PathBuf, sync::Arc, time::Duration};

// how often the demo polls the engine
const POLL_INTERVAL_MS: u64 = 20;

#[derive(FromArgs)]
/// Leafscan runs the tomato leaf diagnosis pipeline on a single image.
struct LeafscanArgs {
    /// optional JSON pipeline configuration
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// command to execute: "diagnose" or "preprocess"
    #[argh(subcommand)]
    command: LeafscanCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum LeafscanCommands {
    Diagnose(DiagnoseCommand),
    Preprocess(PreprocessCommand),
}

#[derive(FromArgs)]
/// Diagnose an image with an ONNX classifier
#[argh(subcommand, name = "diagnose")]
struct DiagnoseCommand {
    /// the path to the ONNX model
    #[argh(option, short = 'm')]
    model: PathBuf,

    /// the path to the label file
    #[argh(option, short = 'l')]
    labels: PathBuf,

    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// optional JSON knowledge base replacing the built-in one
    #[argh(option, short = 'k')]
    knowledge: Option<PathBuf>,

    /// user id to print the history entry for
    #[argh(option, short = 'u')]
    user: Option<String>,

    /// number of threads ONNX Runtime may use per operator
    #[argh(option, short = 't')]
    threads: Option<usize>,
}

#[derive(FromArgs)]
/// Print statistics about the tensor produced for an image
#[argh(subcommand, name = "preprocess")]
struct PreprocessCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,
}

// Polls the engine without blocking the runtime until a result shows up.
async fn next_result(engine: &DiagnosisEngine) -> EngineResult {
    let deadline = tokio::time::Instant::now() + engine.config().response_timeout();
    loop {
        match engine.try_poll_response() {
            EngineResult::Empty(state) if tokio::time::Instant::now() < deadline => {
                log::debug!("Engine is {}", state.as_str());
                tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            result => return result,
        }
    }
}

async fn diagnose(
    config: PipelineConfig,
    command: DiagnoseCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let knowledge = match &command.knowledge {
        Some(path) => KnowledgeBase::from_json_file(path)?,
        None => KnowledgeBase::builtin(),
    };
    let backend = match command.threads {
        Some(threads) => OnnxBackend::new().with_intra_threads(threads),
        None => OnnxBackend::new(),
    };
    let engine = DiagnosisEngine::with_knowledge(backend, config, Arc::new(knowledge));

    engine.load(&command.model, &command.labels)?;
    match next_result(&engine).await {
        EngineResult::Loaded(summary) => {
            log::info!("Model ready with {} labels in {:?}", summary.labels, summary.duration)
        }
        EngineResult::Error(e) => return Err(e.into()),
        EngineResult::Empty(state) => return Err(format!("model still {}", state.as_str()).into()),
        EngineResult::Success(_) => return Err("unexpected diagnosis before load".into()),
    }

    engine.submit(RawImage::from_path(&command.image_path))?;
    let response = match next_result(&engine).await {
        EngineResult::Success(response) => response,
        EngineResult::Error(e) => return Err(e.into()),
        EngineResult::Empty(state) => {
            return Err(format!("engine still {}", state.as_str()).into());
        }
        EngineResult::Loaded(_) => return Err("unexpected load result".into()),
    };

    log::info!("Diagnosis {} took {:?}", response.id, response.duration);
    println!("{}", serde_json::to_string_pretty(&response.record)?);
    println!("{}", response.record.chat_context());
    if let Some(user) = command.user {
        let entry = response.record.to_history_entry(user);
        println!("{}", serde_json::to_string_pretty(&entry)?);
    }

    debug_assert_eq!(engine.state(), PipelineState::Ready);
    Ok(())
}

fn preprocess(
    config: &PipelineConfig,
    command: PreprocessCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = RawImage::from_path(&command.image_path);
    let tensor = Preprocessor::from_config(config).preprocess(&image)?;
    let values = tensor.as_slice();
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    let geometry = tensor.geometry();

    println!(
        "{}x{} -> {}x{}x{} ({} values), mean {:.4}",
        tensor.source_size().0,
        tensor.source_size().1,
        geometry.width,
        geometry.height,
        tensor.channels(),
        values.len(),
        mean
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: LeafscanArgs = argh::from_env();

    let config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };

    match args.command {
        LeafscanCommands::Diagnose(command) => diagnose(config, command).await?,
        LeafscanCommands::Preprocess(command) => preprocess(&config, command)?,
    }

    Ok(())
}
