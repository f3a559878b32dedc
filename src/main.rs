use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tabplot::parser::parse_filter_expr;
use tabplot::{render_request, Dataset, PlotRequest, RenderOptions, YColumns};

#[derive(Parser, Debug)]
#[command(name = "tabplot")]
#[command(about = "Filter tabular data and render it as a chart", long_about = None)]
struct Args {
    /// Data file (.csv, .json, or .xlsx/.xls spreadsheet)
    input: PathBuf,

    /// Complete render request as JSON; chart flags are ignored when given
    #[arg(long)]
    request: Option<String>,

    /// Chart type: line, bar, pie, hist, scatter, box or auto
    #[arg(long, default_value = "auto")]
    chart: String,

    /// X column
    #[arg(short = 'x', long = "x")]
    x: Option<String>,

    /// Y column; repeat for several series
    #[arg(short = 'y', long = "y")]
    y: Vec<String>,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    xlabel: Option<String>,

    #[arg(long)]
    ylabel: Option<String>,

    /// Never draw a legend
    #[arg(long)]
    no_legend: bool,

    /// Figure size in inches
    #[arg(long, num_args = 2, value_names = ["W", "H"])]
    figsize: Option<Vec<f64>>,

    /// Colour for single-series charts (name or #rrggbb)
    #[arg(long)]
    color: Option<String>,

    /// Histogram bin count
    #[arg(long)]
    bins: Option<usize>,

    /// Output format: png, jpeg or html
    #[arg(long, default_value = "png")]
    format: String,

    /// Filter expression such as 'price >= 10'; repeat to combine with AND
    #[arg(long = "filter")]
    filters: Vec<String>,

    /// JSON file with render options (dpi, figsize, bins, jpeg_quality, cdn_base)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the first N rows as JSON instead of rendering
    #[arg(long)]
    preview: Option<usize>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Args {
    fn plot_request(&self) -> Result<PlotRequest> {
        let mut request = match &self.request {
            Some(json) => serde_json::from_str::<PlotRequest>(json).context("Failed to parse --request JSON")?,
            None => PlotRequest {
                chart_type: self.chart.clone(),
                x: self.x.clone(),
                y: match self.y.as_slice() {
                    [] => None,
                    [single] => Some(YColumns::Single(single.clone())),
                    many => Some(YColumns::Many(many.to_vec())),
                },
                title: self.title.clone(),
                xlabel: self.xlabel.clone(),
                ylabel: self.ylabel.clone(),
                legend: Some(!self.no_legend),
                figsize: self.figsize.clone(),
                color: self.color.clone(),
                bins: self.bins,
                format: self.format.clone(),
                filters: None,
            },
        };

        if !self.filters.is_empty() {
            let conditions = request.filters.get_or_insert_with(Vec::new);
            for expr in &self.filters {
                conditions.push(parse_filter_expr(expr)?);
            }
        }
        Ok(request)
    }

    fn render_options(&self) -> Result<RenderOptions> {
        match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse config {}", path.display()))
            }
            None => Ok(RenderOptions::default()),
        }
    }
}

fn write_output(path: Option<&PathBuf>, bytes: &[u8]) -> Result<()> {
    match path {
        Some(path) => fs::write(path, bytes)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(bytes)
                .context("Failed to write output to stdout")?;
            handle.flush().context("Failed to flush stdout")?;
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let dataset = Dataset::load(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    log::info!(
        "Loaded {} rows x {} columns from {}",
        dataset.n_rows(),
        dataset.columns().len(),
        args.input.display()
    );

    if let Some(n) = args.preview {
        let preview = json!({
            "columns": dataset.column_names(),
            "rows": dataset.head_records(n),
        });
        let mut text = serde_json::to_string_pretty(&preview).context("Failed to serialize preview")?;
        text.push('\n');
        return write_output(args.output.as_ref(), text.as_bytes());
    }

    let request = args.plot_request()?;
    let options = args.render_options()?;
    let output = render_request(&dataset, &request, &options).context("Failed to render chart")?;
    log::info!("Rendered {} ({} bytes)", output.mime_type(), output.as_bytes().len());

    write_output(args.output.as_ref(), output.as_bytes())
}
