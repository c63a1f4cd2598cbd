//! ai-dispatch-cli — 通过凭据轮换调度器发送单次 Gemini 请求的命令行工具
//!
//! Usage:
//!   ai-dispatch-cli [OPTIONS] <PROMPT>...      Send one prompt, print the text
//!   ai-dispatch-cli [OPTIONS] -                Read the prompt from stdin

use ai_lib_dispatch::{CallConfig, CallOptions, DispatcherBuilder, GenerateContentConfig, Part};
use anyhow::{anyhow, bail, Context};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_MODEL: &str = "gemini-2.5-pro";

#[derive(Debug, Default)]
struct Args {
    model: Option<String>,
    files: Vec<PathBuf>,
    prompt: Vec<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    system: Option<String>,
    search: bool,
    timeout: Option<Duration>,
    sleep: Option<Duration>,
    dotenv: Option<PathBuf>,
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.is_empty() {
        print_usage();
        std::process::exit(1);
    }
    let args = match parse_args(&argv)? {
        Some(args) => args,
        None => return Ok(()),
    };

    let mut contents = Vec::new();
    for path in &args.files {
        let part = Part::from_file(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        contents.push(part);
    }
    contents.push(Part::text(read_prompt(&args.prompt)?));

    let mut generation = GenerateContentConfig::new();
    if let Some(t) = args.temperature {
        generation = generation.with_temperature(t);
    }
    if let Some(n) = args.max_tokens {
        generation = generation.with_max_output_tokens(n);
    }
    if let Some(s) = &args.system {
        generation = generation.with_system_instruction(s.clone());
    }
    generation = generation.with_google_search(args.search);

    let mut builder = DispatcherBuilder::new();
    if let Some(path) = &args.dotenv {
        builder = builder.dotenv_path(path.clone());
    }
    let mut dispatcher = builder.build()?;
    dispatcher.startup()?;

    let mut options = CallOptions::new();
    if let Some(t) = args.timeout {
        options = options.with_timeout(t);
    }
    if let Some(s) = args.sleep {
        options = options.with_sleep_on_retry(s);
    }

    let model = args.model.as_deref().unwrap_or(DEFAULT_MODEL);
    let result = dispatcher
        .execute_detailed(model, contents, CallConfig::Typed(generation), options)
        .await;
    dispatcher.shutdown();

    let response = result?;
    println!("{}", response.text);
    if args.verbose {
        eprintln!(
            "model={} credential=#{} attempts={} finish={} truncated={} request_id={}",
            model,
            response.credential_index,
            response.attempts,
            response
                .finish_reason
                .as_ref()
                .map(|r| r.as_str())
                .unwrap_or("-"),
            response.truncated,
            response.request_id,
        );
    }
    Ok(())
}

fn print_usage() {
    println!(
        r#"ai-dispatch-cli — 单次 Gemini 调用（带凭据轮换）

USAGE:
    ai-dispatch-cli [OPTIONS] <PROMPT>...
    ai-dispatch-cli [OPTIONS] -              Read the prompt from stdin

OPTIONS:
    -m, --model <id>            Model identifier (default {model})
    -f, --file <path>           Attach a file as inline data (repeatable)
    -t, --temperature <f>       Sampling temperature
        --max-tokens <n>        Maximum output tokens
        --system <text>         System instruction
        --search                Enable Google Search grounding
        --timeout <secs>        Per-attempt timeout
        --sleep <secs>          Pause before rotating after a rate limit
        --dotenv <path>         Fallback file for the credential variable
    -v, --verbose               Print dispatch metadata to stderr
    -h, --help                  Show this help message

ENVIRONMENT:
    GEMINI_API_KEY              One or more keys separated by '|'
    RUST_LOG                    Log filter (e.g. ai_lib_dispatch=info)"#,
        model = DEFAULT_MODEL
    );
}

fn parse_args(argv: &[String]) -> anyhow::Result<Option<Args>> {
    let mut args = Args::default();
    let mut iter = argv.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{} requires a value", flag))
        };
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return Ok(None);
            }
            "-V" | "--version" => {
                println!("ai-dispatch-cli {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "-m" | "--model" => args.model = Some(value(arg)?),
            "-f" | "--file" => args.files.push(PathBuf::from(value(arg)?)),
            "-t" | "--temperature" => {
                args.temperature = Some(value(arg)?.parse().context("invalid temperature")?)
            }
            "--max-tokens" => {
                args.max_tokens = Some(value(arg)?.parse().context("invalid --max-tokens")?)
            }
            "--system" => args.system = Some(value(arg)?),
            "--search" => args.search = true,
            "--timeout" => {
                let secs: u64 = value(arg)?.parse().context("invalid --timeout")?;
                args.timeout = Some(Duration::from_secs(secs));
            }
            "--sleep" => {
                let secs: f64 = value(arg)?.parse().context("invalid --sleep")?;
                if secs < 0.0 {
                    bail!("--sleep must be a non-negative number");
                }
                args.sleep = Some(
                    Duration::try_from_secs_f64(secs)
                        .map_err(|_| anyhow!("--sleep is out of range: {}", secs))?,
                );
            }
            "--dotenv" => args.dotenv = Some(PathBuf::from(value(arg)?)),
            "-v" | "--verbose" => args.verbose = true,
            other if other.starts_with('-') && other != "-" => {
                bail!("unknown option: {}", other)
            }
            other => args.prompt.push(other.to_string()),
        }
    }
    if args.prompt.is_empty() {
        bail!("no prompt given");
    }
    Ok(Some(args))
}

fn read_prompt(words: &[String]) -> anyhow::Result<String> {
    if words.len() == 1 && words[0] == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read prompt from stdin")?;
        return Ok(buf);
    }
    Ok(words.join(" "))
}
