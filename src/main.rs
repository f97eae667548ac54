use std::io::{BufRead, Write};
use std::process::ExitCode;

use taskforge::agent::Runtime;
use taskforge::config::Settings;
use taskforge::schemas::EventKind;

const CONFIG_PATH: &str = "config.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let settings = match Settings::from_file(CONFIG_PATH) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Fatal: failed to load {CONFIG_PATH}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let streaming = settings.ollama.multi_model.streaming.clone();
    let banner_name = settings.agent.name.clone();
    let banner_workspace = settings.agent.workspace.display().to_string();
    let banner_api = settings.ollama.api_url();
    let banner_model = settings.ollama.model.clone();

    #[cfg_attr(not(feature = "syntax-check"), allow(unused_mut))]
    let mut builder = Runtime::builder(settings);
    #[cfg(feature = "syntax-check")]
    {
        match taskforge::verify::PythonSyntaxChecker::new() {
            Ok(checker) => builder = builder.with_syntax_checker(Box::new(checker)),
            Err(e) => log::warn!("Python syntax checking unavailable: {e}"),
        }
    }

    let runtime = match builder.build().await {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Fatal: failed to initialize agent: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Console progress line per event while a request runs.
    if streaming.enabled {
        let show_thinking = streaming.show_thinking;
        runtime.bus().subscribe(move |event| {
            match &event.kind {
                EventKind::Status { phase, model } => {
                    let model = model.as_deref().unwrap_or("-");
                    eprintln!("  [{}] {model}", phase.as_str());
                }
                EventKind::Thinking { chunk } if show_thinking => {
                    let preview: String = chunk.chars().take(120).collect();
                    eprintln!("  [thinking] {preview}");
                }
                EventKind::ToolCall { name, index, total } => {
                    eprintln!("  [tool {}/{total}] {name}", index + 1);
                }
                EventKind::PlanningProgress { length, .. } => {
                    eprintln!("  [planning] {length} chars so far");
                }
                EventKind::Error { message } => eprintln!("  [error] {message}"),
                _ => {}
            }
        });
        log::info!("Streaming progress indicator enabled");
    }

    println!("{}", "=".repeat(60));
    println!("  {banner_name} - Ready");
    println!("{}", "=".repeat(60));
    println!("Workspace: {banner_workspace}");
    println!("Backend:   {banner_api}");
    println!("Model:     {banner_model}");
    println!("{}\n", "=".repeat(60));
    println!("Enter your requests (type 'quit' or 'exit' to stop):\n");

    let stdin = std::io::stdin();
    loop {
        print!("You: ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.to_lowercase().as_str() {
            "quit" | "exit" | "q" => break,
            "/metrics" => {
                println!("\n{}", runtime.metrics().generate_report());
                println!("{}", runtime.manager().report().await);
                continue;
            }
            "/metrics export" => {
                match runtime.export_metrics() {
                    Ok(path) => println!("Metrics exported to {}", path.display()),
                    Err(e) => eprintln!("Metrics export failed: {e}"),
                }
                continue;
            }
            _ => {}
        }

        println!("\nAgent: Thinking...");
        let response = runtime.chat(input).await;
        println!("\n{response}\n");
    }

    println!("\nShutting down agent...");
    match runtime.export_metrics() {
        Ok(path) => println!("Metrics exported to {}", path.display()),
        Err(e) => eprintln!("Metrics export failed: {e}"),
    }

    ExitCode::SUCCESS
}
