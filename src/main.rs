use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser};

use phatsadu::builder::build_template_data;
use phatsadu::docx::merge::{render_document, MergeOptions};
use phatsadu::docx::package::{fingerprint, OoxmlPackage};
use phatsadu::docx::scan::scan_package;
use phatsadu::error::TemplateError;
use phatsadu::payload::parse_payload;
use phatsadu::registry::TemplateRegistry;

#[derive(Parser, Debug)]
#[command(name = "phatsadu")]
#[command(about = "Scan and fill {tag} placeholders in Thai procurement DOCX forms", long_about = None)]
struct Args {
    /// Template .docx (or use --registry with --code)
    #[arg(value_name = "DOCX")]
    template: Option<PathBuf>,

    /// Template registry TOML
    #[arg(long, value_name = "TOML")]
    registry: Option<PathBuf>,

    /// Form code to look up in the registry
    #[arg(long, value_name = "CODE")]
    code: Option<String>,

    /// Scan template tags and print a summary (exit code 2 when issues are found)
    #[arg(long)]
    scan: bool,

    /// Write the scan report as JSON to this path
    #[arg(long, value_name = "JSON")]
    scan_json: Option<PathBuf>,

    /// Render the template using this payload JSON
    #[arg(long, value_name = "JSON")]
    render: Option<PathBuf>,

    /// Output .docx (default: <template_stem>_filled.docx)
    #[arg(short, long, value_name = "DOCX")]
    output: Option<PathBuf>,

    /// Replacement text for tags whose field is missing from the payload
    #[arg(long, value_name = "TEXT", default_value = "-")]
    missing_glyph: String,

    /// List the package's parts, then exit
    #[arg(long)]
    list_parts: bool,

    /// Print the template fingerprint, then exit
    #[arg(long)]
    fingerprint: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.template.is_some() && args.registry.is_some() {
        return Err(anyhow::anyhow!(
            "give either a template path or --registry/--code, not both"
        ));
    }

    let (bytes, template_path) = if let Some(reg_path) = args.registry.as_ref() {
        let registry = TemplateRegistry::from_toml_path(reg_path)?;
        let code = match args.code.as_deref() {
            Some(code) => code,
            None => {
                let known: Vec<&str> = registry.codes().collect();
                return Err(anyhow::anyhow!(
                    "--registry requires --code (known codes: {})",
                    known.join(", ")
                ));
            }
        };
        let path = registry.resolve_file(code, reg_path)?;
        let bytes = std::fs::read(&path)
            .with_context(|| format!("read template: {}", path.display()))?;
        registry.verify_bytes(code, &bytes)?;
        (bytes, path)
    } else if let Some(path) = args.template.clone() {
        let bytes = std::fs::read(&path)
            .with_context(|| format!("read template: {}", path.display()))?;
        (bytes, path)
    } else if args.code.is_some() {
        return Err(anyhow::anyhow!("--code requires --registry"));
    } else {
        let mut cmd = Args::command();
        cmd.print_help().context("print help")?;
        eprintln!(
            "\n\nUSAGE:\n  phatsadu <template.docx> [--scan]\n  phatsadu --registry forms.toml --code tor --render payload.json -o out.docx\n"
        );
        return Ok(());
    };

    log::info!(
        "template {} ({} bytes, fingerprint {})",
        template_path.display(),
        bytes.len(),
        fingerprint(&bytes)
    );

    if args.fingerprint {
        println!("{}", fingerprint(&bytes));
        return Ok(());
    }

    if args.list_parts {
        let pkg = OoxmlPackage::open(&bytes)?;
        for name in pkg.part_names() {
            println!("{name}");
        }
        return Ok(());
    }

    if let Some(payload_path) = args.render.as_ref() {
        let text = std::fs::read_to_string(payload_path)
            .with_context(|| format!("read payload: {}", payload_path.display()))?;
        let value: serde_json::Value =
            serde_json::from_str(&text).context("parse payload json")?;
        let payload = parse_payload(&value)?;
        let data = build_template_data(&payload);
        let opts = MergeOptions {
            missing_glyph: args.missing_glyph.clone(),
        };
        let output = match args.output {
            Some(p) => p,
            None => {
                let stem = template_path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("output")
                    .to_string();
                template_path.with_file_name(format!("{stem}_filled.docx"))
            }
        };
        match render_document(&bytes, &data, &opts) {
            Ok(rendered) => {
                std::fs::write(&output, rendered)
                    .with_context(|| format!("write output: {}", output.display()))?;
                eprintln!("Wrote {}", output.display());
                return Ok(());
            }
            Err(TemplateError::Render(render_err)) => {
                for issue in &render_err.issues {
                    eprintln!("{}: {}", issue.part_name, issue.explanation);
                }
                return Err(anyhow::anyhow!(
                    "template render failed: {} issue(s)",
                    render_err.issues.len()
                ));
            }
            Err(other) => return Err(other.into()),
        }
    }

    // no mode given defaults to a scan; it is read-only
    let report = scan_package(&bytes, &[])?;
    if let Some(json_path) = args.scan_json.as_ref() {
        let json = serde_json::to_string_pretty(&report).context("serialize scan report")?;
        std::fs::write(json_path, json)
            .with_context(|| format!("write scan report: {}", json_path.display()))?;
        eprintln!("Wrote {}", json_path.display());
    }
    if args.scan || args.scan_json.is_none() {
        println!("fingerprint {}", report.fingerprint);
        for part in &report.parts {
            println!(
                "{}: {} tag(s), {} issue(s)",
                part.part_name,
                part.tags.len(),
                part.issues.len()
            );
            for issue in &part.issues {
                println!("  - {}", issue.message);
            }
        }
    }
    if report.has_issues {
        std::process::exit(2);
    }
    Ok(())
}
