//! # Etiqueta CLI
//!
//! Command-line interface for label template printing.
//!
//! ## Usage
//!
//! ```bash
//! # List the fields a template exposes
//! etiqueta fields label.svg
//!
//! # Render a preview PNG, overriding a field value
//! etiqueta preview label.svg --set Name="Oolong 50g" --out preview.png
//!
//! # Print on a 30x20mm label over a specific port
//! etiqueta print label.svg --port /dev/ttyACM0 --set Name="Oolong 50g"
//!
//! # Landscape, darker burn, continuous paper
//! etiqueta print label.svg --landscape --darkness 12 --paper continuous
//!
//! # Enumerate candidate serial ports
//! etiqueta ports
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use etiqueta::{
    pipeline::PrintJob,
    printer::{Orientation, PrinterConfig},
    protocol::PaperType,
    render::Compositor,
    store::{self, JsonFileStore},
    template::{measure::SystemFontMeasurer, FieldKind, Template},
    transport::{self, FirstUsbSelector, FixedPathSelector, TransportSession},
    EtiquetaError,
};

/// Etiqueta - label template printing utility
#[derive(Parser, Debug)]
#[command(name = "etiqueta")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the fields a template exposes
    Fields {
        /// Template SVG file
        template: PathBuf,
    },

    /// Render a template to a preview PNG
    Preview {
        /// Template SVG file
        template: PathBuf,

        /// Output PNG path
        #[arg(long, default_value = "preview.png")]
        out: PathBuf,

        /// Skip dithering and keep the continuous-tone surface
        #[arg(long)]
        no_dither: bool,

        #[command(flatten)]
        fields: FieldArgs,

        #[command(flatten)]
        paper: PaperArgs,
    },

    /// Print a template on the connected label printer
    Print {
        /// Template SVG file
        template: PathBuf,

        /// Serial port path (defaults to the first USB serial device)
        #[arg(long)]
        port: Option<PathBuf>,

        /// Persist the printer configuration per device in this JSON store
        #[arg(long)]
        store: Option<PathBuf>,

        #[command(flatten)]
        fields: FieldArgs,

        #[command(flatten)]
        paper: PaperArgs,
    },

    /// Enumerate candidate serial ports
    Ports,
}

#[derive(Args, Debug)]
struct FieldArgs {
    /// Set a field value as id=value (repeatable)
    #[arg(long = "set", value_name = "ID=VALUE")]
    set: Vec<String>,

    /// Hide a field by id (repeatable)
    #[arg(long = "hide", value_name = "ID")]
    hide: Vec<String>,
}

#[derive(Args, Debug)]
struct PaperArgs {
    /// Label width in millimeters
    #[arg(long, default_value_t = 30.0)]
    width_mm: f32,

    /// Label height in millimeters
    #[arg(long, default_value_t = 20.0)]
    height_mm: f32,

    /// Rotate the label 90 degrees at print time
    #[arg(long)]
    landscape: bool,

    /// Burn darkness, 1-15
    #[arg(long, default_value_t = 8)]
    darkness: u8,

    /// Feed speed, 1-5
    #[arg(long, default_value_t = 5)]
    speed: u8,

    /// Paper stock loaded in the printer
    #[arg(long, value_enum, default_value = "gaps")]
    paper: PaperArg,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum PaperArg {
    /// Die-cut labels with gaps
    Gaps,
    /// Continuous roll
    Continuous,
    /// Labels with black marks
    Marks,
}

impl From<PaperArg> for PaperType {
    fn from(arg: PaperArg) -> Self {
        match arg {
            PaperArg::Gaps => PaperType::LabelWithGaps,
            PaperArg::Continuous => PaperType::Continuous,
            PaperArg::Marks => PaperType::LabelWithMarks,
        }
    }
}

impl PaperArgs {
    fn to_config(&self) -> PrinterConfig {
        PrinterConfig {
            darkness: self.darkness,
            speed: self.speed,
            paper: self.paper.into(),
            paper_width_mm: self.width_mm,
            paper_height_mm: self.height_mm,
            orientation: if self.landscape {
                Orientation::Landscape
            } else {
                Orientation::Portrait
            },
            ..PrinterConfig::default()
        }
    }
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), EtiquetaError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fields { template } => {
            let template = load_template(&template)?;
            for field in &template.fields {
                let kind = match field.kind {
                    FieldKind::Text => "text",
                    FieldKind::Date => "date",
                    FieldKind::Qr => "qr",
                    FieldKind::Image => "image",
                };
                let label = field.label.as_deref().unwrap_or("-");
                let default = template.values.get(&field.id).map_or("", |v| v.as_str());
                println!(
                    "{:<20} {:<6} {:<20} {:?}",
                    field.id,
                    kind,
                    label,
                    default.replace('\n', "\\n")
                );
            }
        }

        Commands::Preview {
            template,
            out,
            no_dither,
            fields,
            paper,
        } => {
            let template = load_template(&template)?;
            let config = paper.to_config();
            let mut job = PrintJob::new(&template, &config);
            fields.apply(&mut job);

            let compositor = Compositor::new();
            let measurer = SystemFontMeasurer::new(compositor.fontdb());
            let surface = if no_dither {
                job.composite(&compositor, &measurer)?
            } else {
                job.rasterize(&compositor, &measurer)?
            };
            surface
                .to_image()
                .save(&out)
                .map_err(|e| EtiquetaError::Io(std::io::Error::other(e)))?;
            println!("Wrote {} ({}x{})", out.display(), surface.width(), surface.height());
        }

        Commands::Print {
            template,
            port,
            store: store_path,
            fields,
            paper,
        } => {
            let template = load_template(&template)?;
            let config = paper.to_config();
            let mut job = PrintJob::new(&template, &config);
            fields.apply(&mut job);

            let compositor = Compositor::new();
            let measurer = SystemFontMeasurer::new(compositor.fontdb());
            let frame = job.encode(&compositor, &measurer)?;

            let mut session = TransportSession::new();
            let connected = match port {
                Some(path) => session.connect(&FixedPathSelector { path })?,
                None => session.connect(&FirstUsbSelector)?,
            };
            if !connected {
                eprintln!("No device selected.");
                return Ok(());
            }

            let ok = session.print(&frame);
            if ok {
                println!("Printed {} bytes.", frame.to_bytes().len());
                if let (Some(path), Some(device_id)) = (store_path, session.device_id()) {
                    let mut store = JsonFileStore::open(path)?;
                    store::save_printer_config(&mut store, device_id, &config);
                }
            }
            session.disconnect();
            if !ok {
                return Err(EtiquetaError::Transport("print failed".into()));
            }
        }

        Commands::Ports => {
            let ports = transport::list_ports()?;
            if ports.is_empty() {
                println!("No candidate serial ports found.");
            }
            for port in ports {
                match port.device_id() {
                    Some(id) => println!("{}  usb {}", port.path.display(), id),
                    None => println!("{}", port.path.display()),
                }
            }
        }
    }

    Ok(())
}

impl FieldArgs {
    fn apply(&self, job: &mut PrintJob) {
        for pair in &self.set {
            match pair.split_once('=') {
                Some((id, value)) => {
                    job.overrides.insert(id.to_string(), value.to_string());
                }
                None => eprintln!("Ignoring malformed --set '{pair}' (expected ID=VALUE)"),
            }
        }
        for id in &self.hide {
            job.hidden.insert(id.clone());
        }
    }
}

fn load_template(path: &Path) -> Result<Template, EtiquetaError> {
    let svg = std::fs::read_to_string(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "template".into());
    Template::from_svg(store::generate_template_id(), name, svg)
}
