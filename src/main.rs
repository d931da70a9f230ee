use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tilegrid::config::{self, ResetFlags};
use tilegrid::format::CourseFormat;
use tilegrid::imaging::RustBackend;
use tilegrid::render::RenderContext;
use tilegrid::store::{FsBlobStore, FsStore};
use tilegrid::types::{CourseSections, SectionId, Timestamp};
use tilegrid::visibility::Capabilities;
use tilegrid::{html, output};

#[derive(Parser)]
#[command(name = "tilegrid")]
#[command(about = "Section tile grid for course pages")]
#[command(long_about = "\
Section tile grid for course pages

Each course section becomes a fixed-size tile with a title, an optional
image and a state (active, inactive or locked).

Data directory layout:

  data/
  ├── config.toml                  # Site defaults (optional)
  ├── settings/<course-id>.json    # Per-course settings (created on first use)
  ├── images/<section-id>.json     # Per-section image records
  └── blobs/<hh>/<sha256>-<n>      # Original and displayed images

Sections are read from a JSON file:

  { \"marker\": 2,
    \"sections\": [ { \"id\": 10, \"number\": 0, \"name\": \"General\" },
                  { \"id\": 11, \"number\": 1, \"summary\": \"<p>Week one</p>\",
                    \"window\": { \"start\": 1700000000, \"end\": 1700600000 } } ] }

Run 'tilegrid gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Data directory
    #[arg(long, default_value = "tilegrid-data", global = true)]
    data: PathBuf,

    /// Course id
    #[arg(long, default_value_t = 1, global = true)]
    course: u64,

    /// Debug logging and image diagnostics on tiles
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Sections whose displayed images a settings change drops right away.
/// Unlisted sections rebuild on their next render.
#[derive(clap::Args, Clone)]
struct SectionsArg {
    /// Sections JSON file of the course
    #[arg(long)]
    sections: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Render a course's tiles and write them as HTML
    Render {
        /// Sections JSON file
        sections: PathBuf,
        /// Current time as a Unix timestamp (defaults to now)
        #[arg(long)]
        now: Option<Timestamp>,
        /// When the viewer last opened the course, as a Unix timestamp
        #[arg(long)]
        last_access: Option<Timestamp>,
        /// Render as a viewer allowed to see hidden sections
        #[arg(long)]
        view_hidden: bool,
        /// HTML output file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Upload the image of a section
    SetImage { section: SectionId, file: PathBuf },
    /// Remove the image of a section
    ClearImage { section: SectionId },
    /// Show the image record of a section
    Image { section: SectionId },
    /// Forget a deleted section
    DeleteSection { section: SectionId },
    /// Show the course settings
    Settings,
    /// Change one setting, e.g. `set container.width 256`
    Set {
        key: String,
        value: String,
        #[command(flatten)]
        sections: SectionsArg,
    },
    /// Put groups of settings back to the site defaults
    Reset {
        /// Container width and aspect ratio
        #[arg(long)]
        size: bool,
        /// Image resize method
        #[arg(long)]
        resize: bool,
        /// Border and colours
        #[arg(long)]
        style: bool,
        /// New activity indicator
        #[arg(long)]
        new_activity: bool,
        #[command(flatten)]
        sections: SectionsArg,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let defaults = config::load_config(&cli.data)?;
    init_thread_pool(&defaults.processing);
    let format = CourseFormat::new(
        Arc::new(FsStore::new(&cli.data)),
        Arc::new(FsBlobStore::new(&cli.data)),
        Arc::new(RustBackend::new()),
        defaults,
    );
    let course = cli.course;

    match cli.command {
        Command::Render {
            sections,
            now,
            last_access,
            view_hidden,
            out,
        } => {
            let sections = read_sections(&sections)?;
            let mut ctx = RenderContext::new(course, now.unwrap_or_else(unix_now));
            ctx.last_access = last_access;
            ctx.verbose = cli.verbose;
            if view_hidden {
                ctx.capabilities = Capabilities::editor();
            }
            let rendered = format.render(&sections, &ctx)?;
            let settings = format.settings(course)?;
            output::print_render_output(
                course,
                &rendered,
                &settings,
                &format.slots().stats(),
                cli.verbose,
            );
            if let Some(out) = out {
                let base = image_base(&cli.data, &out);
                let url = |image: &tilegrid::types::ImageRef| {
                    format!(
                        "{base}{}?v={}",
                        FsBlobStore::relative_path(&image.blob),
                        image.version
                    )
                };
                let title = format!("Course {course}");
                let page = html::render_page(&title, &rendered, &settings, &url);
                std::fs::write(&out, page.into_string())?;
                println!("==> Wrote {}", out.display());
            }
        }
        Command::SetImage { section, file } => {
            let bytes = std::fs::read(&file)?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let record = format.slots().set_image(section, &filename, &bytes)?;
            output::print_image_record(&record);
        }
        Command::ClearImage { section } => {
            format.slots().clear_image(section)?;
            println!("Section {section}: image cleared");
        }
        Command::Image { section } => match format.slots().record(section)? {
            Some(record) => output::print_image_record(&record),
            None => println!("Section {section}: no image"),
        },
        Command::DeleteSection { section } => {
            format.delete_section(section)?;
            println!("Section {section}: deleted");
        }
        Command::Settings => {
            let settings = format.settings(course)?;
            output::print_settings(course, &settings);
        }
        Command::Set {
            key,
            value,
            sections,
        } => {
            let update = format.set(course, &key, &value, &section_ids(&sections)?)?;
            print_change(course, update.invalidated);
        }
        Command::Reset {
            size,
            resize,
            style,
            new_activity,
            sections,
        } => {
            let flags = ResetFlags {
                size,
                resize,
                style,
                new_activity,
            };
            if !flags.any() {
                return Err("nothing to reset: pass --size, --resize, --style or --new-activity".into());
            }
            let update = format.reset_settings(course, flags, &section_ids(&sections)?)?;
            print_change(course, update.invalidated);
        }
        // Printed before the data directory is opened.
        Command::GenConfig => {}
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the config can only lower it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as Timestamp)
        .unwrap_or_default()
}

fn read_sections(path: &Path) -> Result<CourseSections, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn section_ids(arg: &SectionsArg) -> Result<Vec<SectionId>, Box<dyn std::error::Error>> {
    match &arg.sections {
        Some(path) => Ok(read_sections(path)?.section_ids()),
        None => Ok(Vec::new()),
    }
}

/// Prefix that reaches the data directory from the HTML file's directory.
fn image_base(data: &Path, out: &Path) -> String {
    let out_dir = match out.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let data = std::fs::canonicalize(data).unwrap_or_else(|_| data.to_path_buf());
    let out_dir = std::fs::canonicalize(out_dir).unwrap_or_else(|_| out_dir.to_path_buf());
    match data.strip_prefix(&out_dir) {
        Ok(rel) if rel.as_os_str().is_empty() => String::new(),
        Ok(rel) => format!("{}/", rel.display()),
        Err(_) => format!("file://{}/", data.display()),
    }
}

fn print_change(course: u64, invalidated: usize) {
    for line in output::format_settings_change(course, invalidated) {
        println!("{}", line);
    }
}
