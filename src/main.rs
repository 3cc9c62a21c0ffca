use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{CommandFactory, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use docx_merge::config::{find_default_config, load_config, AppConfig};
use docx_merge::data::MergeData;
use docx_merge::{Docx, ImageValue};

#[derive(Parser, Debug)]
#[command(name = "docx-merge")]
#[command(about = "Fill {{placeholders}} in a .docx template with text, images and table rows", long_about = None)]
struct Args {
    /// Input template .docx
    #[arg(short, long, value_name = "DOCX")]
    input: Option<PathBuf>,

    /// Output .docx
    #[arg(short, long, value_name = "DOCX", default_value = "output.docx")]
    output: PathBuf,

    /// JSON object string, or path to a JSON file
    #[arg(short, long, value_name = "JSON")]
    data: Option<String>,

    /// Placeholder prefix (default: {{, or the config file value)
    #[arg(short = 'p', long)]
    prefix: Option<String>,

    /// Placeholder suffix (default: }}, or the config file value)
    #[arg(short = 's', long)]
    suffix: Option<String>,

    /// Replace image placeholder NAME with the image at PATH (repeatable)
    #[arg(long, value_name = "NAME=PATH")]
    image: Vec<String>,

    /// Clone the table row holding MARK N times before values are set (repeatable)
    #[arg(long, value_name = "MARK=N")]
    clone_row: Vec<String>,

    /// Ask Word to refresh fields when the output is opened
    #[arg(long)]
    update_fields: bool,

    /// Print the placeholders found in the template and exit
    #[arg(long)]
    list: bool,

    /// Check that every rewritten part is well-formed XML before saving
    #[arg(long)]
    check: bool,

    /// Config file path (default: search for docx-merge.toml upwards, or DOCX_MERGE_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let Some(input) = args.input.clone() else {
        let mut cmd = Args::command();
        cmd.print_help().context("print help")?;
        eprintln!("\n\nUSAGE:\n  docx-merge -i template.docx -d '{{\"name\":\"value\"}}'\n");
        return Ok(());
    };

    let file_cfg = match args.config.clone().or_else(find_default_config) {
        Some(p) => load_config(&p)?,
        None => AppConfig::default(),
    };
    let mut merge_cfg = file_cfg.placeholders.clone();
    if let Some(prefix) = args.prefix.clone() {
        merge_cfg.placeholder_prefix = prefix;
    }
    if let Some(suffix) = args.suffix.clone() {
        merge_cfg.placeholder_suffix = suffix;
    }
    if merge_cfg.placeholder_prefix.is_empty() || merge_cfg.placeholder_suffix.is_empty() {
        return Err(anyhow!("placeholder prefix and suffix must not be empty"));
    }

    let mut doc = Docx::load_with_config(&input, merge_cfg)
        .with_context(|| format!("load template: {}", input.display()))?;

    if args.list {
        for name in doc.placeholders() {
            println!("{name}");
        }
        return Ok(());
    }

    for pair in &args.clone_row {
        let (mark, n) = split_pair(pair, "--clone-row")?;
        let n: usize = n
            .parse()
            .with_context(|| format!("--clone-row {pair}: N must be a number"))?;
        doc.clone_row(mark, n)?;
    }

    if let Some(data) = args.data.as_deref() {
        let data = MergeData::from_arg(data)?;
        let replaced = data.apply(&mut doc)?;
        info!(replaced, "filled text placeholders");
    }

    for pair in &args.image {
        let (name, path) = split_pair(pair, "--image")?;
        let image = ImageValue::open(path).with_context(|| format!("--image {pair}"))?;
        let n = doc.set_image(name, &image)?;
        info!(%name, placeholders = n, "placed image");
    }

    if args.update_fields || file_cfg.output.update_fields.unwrap_or(false) {
        doc.set_update_fields(true);
    }

    if args.check || file_cfg.output.check_xml.unwrap_or(false) {
        doc.check_well_formed().context("check output xml")?;
    }

    doc.save_to_file(&args.output)
        .with_context(|| format!("save output: {}", args.output.display()))?;
    eprintln!("Wrote: {}", args.output.display());
    Ok(())
}

fn split_pair<'a>(pair: &'a str, flag: &str) -> anyhow::Result<(&'a str, &'a str)> {
    pair.split_once('=')
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .ok_or_else(|| anyhow!("{flag} expects KEY=VALUE, got {pair:?}"))
}
