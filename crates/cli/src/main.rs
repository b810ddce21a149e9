use anyhow::{anyhow, bail, Context};
use config::{Config, File};
use indexmap::IndexMap;
use log::{info, LevelFilter};
use serde::{Deserialize, Serialize};
use simple_logger::SimpleLogger;
use solfield::{
    timed, CollectorConfig, FieldConfig, FieldRenderer, RenderConfig,
    SolarPosition, TrackerField,
};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    process,
};
use structopt::StructOpt;
use strum::{Display, EnumString};

/// CLI for calculating shading in fields of two-axis sun trackers.
#[derive(Debug, StructOpt)]
#[structopt(name = "solfield")]
struct Opt {
    /// Path to a run file that defines the field, the collector shape and the
    /// sun positions to evaluate. Supported formats: JSON, TOML
    #[structopt(short, long)]
    config: PathBuf,

    /// If given, outputs will be saved to this directory. The exact files
    /// that appear in the directory are defined by the output formats. See
    /// `--output-formats` for more info
    #[structopt(short, long)]
    output: Option<PathBuf>,

    /// The format(s) to output the results in. Supported formats:
    ///
    /// cfg - The full run file, with every default filled in, in TOML format
    ///
    /// json - The generated field layout (field.json) and the shaded fraction
    ///   of every sample (results.json)
    ///
    /// svg - 2D rendering of the field layout
    ///
    /// shadows - 2D rendering of the collector shading, one file per sample
    #[structopt(short = "f", long)]
    output_formats: Vec<OutputFormat>,

    /// Only draw the shaded area, not the outlines of individual shadows.
    /// Only relevant for the shadows output format.
    #[structopt(long)]
    hide_shadows: bool,

    /// The logging level to use. See
    /// https://docs.rs/log/0.4.11/log/enum.LevelFilter.html for options
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,
}

/// Different output formats.
#[derive(Copy, Clone, Debug, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
enum OutputFormat {
    // If you change this, make sure to update the help text for
    // `--output-formats`!
    /// Export the full run file in a human-readable file
    Cfg,
    /// Export the field layout and results as JSON
    Json,
    /// Render the field layout as a 2D SVG
    Svg,
    /// Render the shading of each sample as a 2D SVG
    Shadows,
    /* If you change this, make sure to update the help text for
     * `--output-formats`! */
}

impl OutputFormat {
    fn file_ext(self) -> &'static str {
        match self {
            Self::Cfg => "toml",
            Self::Json => "json",
            Self::Svg | Self::Shadows => "svg",
        }
    }
}

/// Everything needed for one run of the CLI
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RunConfig {
    field: FieldConfig,
    collector: CollectorConfig,
    render: RenderConfig,
    samples: Vec<SampleConfig>,
}

/// A single sun position to evaluate
#[derive(Clone, Debug, Serialize, Deserialize)]
struct SampleConfig {
    /// Name of the sample in outputs. Defaults to the sample's index.
    label: Option<String>,
    elevation: f64,
    azimuth: f64,
}

impl RunConfig {
    /// Sun positions keyed by their label. Labels must be unique.
    fn samples(&self) -> anyhow::Result<IndexMap<String, SolarPosition>> {
        let mut samples = IndexMap::with_capacity(self.samples.len());
        for (i, sample) in self.samples.iter().enumerate() {
            let label = match &sample.label {
                Some(label) => label.clone(),
                None => format!("sample_{}", i),
            };
            let position = SolarPosition::new(sample.elevation, sample.azimuth);
            if samples.insert(label.clone(), position).is_some() {
                bail!("duplicate sample label {:?}", label);
            }
        }
        Ok(samples)
    }
}

/// Output format of the json results
#[derive(Debug, Serialize)]
struct Results<'a> {
    samples: &'a IndexMap<String, SolarPosition>,
    shaded_fractions: &'a IndexMap<String, f64>,
}

/// Everything an output format could be generated from
struct RunOutput<'a> {
    run_config: &'a RunConfig,
    field: &'a TrackerField,
    renderer: &'a FieldRenderer,
    samples: &'a IndexMap<String, SolarPosition>,
    shaded_fractions: &'a IndexMap<String, f64>,
}

fn load_config(config_path: &Path) -> anyhow::Result<RunConfig> {
    // Load config
    let mut settings = Config::new();
    let config_path = config_path.to_str().ok_or_else(|| {
        anyhow!("invalid character in path {:?}", config_path)
    })?;
    settings
        .merge(File::with_name(config_path))
        .context("error reading config file")?;
    settings.try_into().context("error reading config")
}

/// Generate the output file(s) for the given format. Returns the name (without
/// extension) and contents of every file.
fn generate_files(
    output_format: OutputFormat,
    output: &RunOutput,
) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
    let files = match output_format {
        OutputFormat::Cfg => {
            // Serialize the whole run file via toml
            let cfg = toml::to_string_pretty(output.run_config)
                .context("error serializing config")?;
            vec![("field".into(), cfg.into_bytes())]
        }
        OutputFormat::Json => {
            let results = Results {
                samples: output.samples,
                shaded_fractions: output.shaded_fractions,
            };
            let json = serde_json::to_string_pretty(&results)
                .context("error serializing results")?;
            vec![
                ("field".into(), output.field.to_json().into_bytes()),
                ("results".into(), json.into_bytes()),
            ]
        }
        OutputFormat::Svg => {
            // Render the field layout in 2D
            let svg = output.renderer.render_layout_svg(output.field);
            vec![("layout".into(), svg.into_bytes())]
        }
        OutputFormat::Shadows => output
            .samples
            .iter()
            .map(|(label, &sun)| {
                let (_, svg) =
                    output.renderer.render_shading_svg(output.field, sun);
                (format!("shading_{}", label), svg.into_bytes())
            })
            .collect(),
    };
    Ok(files)
}

/// Full file name for an output file. Labels can contain dots, so the
/// extension is appended rather than set with [Path::with_extension].
fn output_file_name(name: &str, output_format: OutputFormat) -> String {
    format!("{}.{}", name, output_format.file_ext())
}

/// Generate an output form of the results in the given format, and write it
/// to the output directory.
fn gen_output(
    output_dir: &Path,
    output_format: OutputFormat,
    output: &RunOutput,
) -> anyhow::Result<()> {
    timed!(
        format!("Generating {} output", output_format),
        log::Level::Info,
        {
            for (name, bytes) in generate_files(output_format, output)? {
                let output_file_path =
                    output_dir.join(output_file_name(&name, output_format));
                let mut file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&output_file_path)
                    .with_context(|| {
                        format!(
                            "error opening output file {:?}",
                            &output_file_path
                        )
                    })?;
                file.write_all(&bytes).with_context(|| {
                    format!("error writing to file {:?}", &output_file_path)
                })?;
                info!("Wrote {:?}", &output_file_path);
            }
        }
    );

    Ok(())
}

/// Print one line per sample to stdout
fn print_results(
    samples: &IndexMap<String, SolarPosition>,
    shaded_fractions: &IndexMap<String, f64>,
) {
    let label_width = samples.keys().map(String::len).max().unwrap_or(0).max(5);
    println!(
        "{:<width$}  {:>9}  {:>9}  {:>8}",
        "label",
        "elevation",
        "azimuth",
        "shaded",
        width = label_width
    );
    for (label, sun) in samples {
        let fraction = shaded_fractions.get(label).copied().unwrap_or(f64::NAN);
        println!(
            "{:<width$}  {:>9.2}  {:>9.2}  {:>8.4}",
            label,
            sun.elevation,
            sun.azimuth,
            fraction,
            width = label_width
        );
    }
}

/// Run the CLI with some options
fn run(opt: Opt) -> anyhow::Result<()> {
    SimpleLogger::new().with_level(opt.log_level).init()?;

    let mut run_config = load_config(&opt.config)?;
    if opt.hide_shadows {
        run_config.render.show_shadows = false;
    }
    let samples = run_config.samples()?;

    let field = TrackerField::from_collector(
        run_config.field.clone(),
        &run_config.collector,
    )?;
    let shaded_fractions = field.shaded_fraction_series(&samples);
    print_results(&samples, &shaded_fractions);

    // If an output dir was specified, write out output format(s) there
    if let Some(output_dir) = opt.output {
        if opt.output_formats.is_empty() {
            bail!("output dir was specified, but no output formats were given")
        }
        fs::create_dir_all(&output_dir)?;

        let renderer = FieldRenderer::new(run_config.render)
            .context("invalid render config")?;
        let output = RunOutput {
            run_config: &run_config,
            field: &field,
            renderer: &renderer,
            samples: &samples,
            shaded_fractions: &shaded_fractions,
        };
        for output_format in opt.output_formats {
            gen_output(&output_dir, output_format, &output)?;
        }
    }

    Ok(())
}

fn main() {
    let exit_code = match run(Opt::from_args()) {
        Ok(_) => 0,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            1
        }
    };
    process::exit(exit_code);
}
