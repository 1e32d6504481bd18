use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use uplstudio_highlight::{
    builtin, HighlightKind, HighlightToken, LanguageDefinition, LanguageRegistry, LanguageRules,
    Theme,
};
use uplstudio_project::{DragEnd, FileId, Studio};
use uplstudio_settings::{DirectoryStore, PreferenceKey, PreferencesStore};

const LOG_ENV: &str = "UPLSTUDIO_LOG";

#[derive(Parser)]
#[command(
    name = "uplstudio-cli",
    about = "Manage and highlight UPL Studio workspaces",
    author,
    version
)]
struct Cli {
    /// 指定工作區根目錄；預設為目前目錄。 / Workspace root (defaults to current directory).
    #[arg(long, global = true, value_name = "PATH")]
    workspace: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 管理工作區檔案清單。 / Manage the workspace file list.
    #[command(subcommand)]
    Files(FilesCommand),
    /// 顯示檔案內容。 / Print a file's content (active file by default).
    Show(ShowArgs),
    /// 寫入檔案內容。 / Replace a file's content from a file or stdin.
    Write(WriteArgs),
    /// 語法標示。 / Print the highlight tokens of a file.
    Highlight(HighlightArgs),
    /// 匯出內建 UPL 語法規則。 / Print the built-in UPL rule table as JSON.
    Rules(RulesArgs),
    /// 管理偏好設定。 / Show, import or export preferences.
    #[command(subcommand)]
    Preferences(PreferencesCommand),
}

#[derive(Subcommand)]
enum FilesCommand {
    /// List files in display order; the active file is marked with '*'.
    List,
    /// Create a new file and make it active.
    Add,
    /// Remove a file from the workspace (its content stays stored).
    Delete(FileArg),
    /// Make a file active.
    Select(FileArg),
    /// Drag a file onto another file's position.
    Move(MoveArgs),
    /// Replace the order with an explicit permutation.
    Reorder(ReorderArgs),
    /// List stored content that no longer belongs to any file.
    Orphans(OrphansArgs),
}

#[derive(Args)]
struct FileArg {
    #[arg(value_name = "ID")]
    id: String,
}

#[derive(Args)]
struct MoveArgs {
    /// File being dragged.
    #[arg(value_name = "ID")]
    dragged: String,
    /// File it is dropped onto; omit to simulate a drop outside the list.
    #[arg(long, value_name = "ID")]
    onto: Option<String>,
}

#[derive(Args)]
struct ReorderArgs {
    #[arg(value_name = "ID", required = true)]
    ids: Vec<String>,
}

#[derive(Args)]
struct OrphansArgs {
    /// Delete the orphaned content instead of listing it.
    #[arg(long)]
    prune: bool,
}

#[derive(Args)]
struct ShowArgs {
    #[arg(value_name = "ID")]
    id: Option<String>,
}

#[derive(Args)]
struct WriteArgs {
    #[arg(value_name = "ID")]
    id: Option<String>,
    /// 讀取內容的來源檔案；預設為標準輸入。 / Source file; stdin when omitted.
    #[arg(long, value_name = "FILE")]
    from: Option<PathBuf>,
}

#[derive(Args)]
struct HighlightArgs {
    #[arg(value_name = "ID")]
    id: Option<String>,
    #[arg(long, value_enum, default_value_t = HighlightFormat::Plain)]
    format: HighlightFormat,
    /// 使用自訂語法規則 JSON。 / Highlight with a custom rule table instead.
    #[arg(long, value_name = "FILE")]
    rules: Option<PathBuf>,
}

#[derive(Args)]
struct RulesArgs {
    /// 輸出檔案路徑；預設為標準輸出。 / Destination file; stdout when omitted.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum HighlightFormat {
    Plain,
    Json,
    Ansi,
}

#[derive(Subcommand)]
enum PreferencesCommand {
    /// 顯示目前偏好設定。 / Print current preferences as JSON.
    Show,
    /// 匯出目前偏好設定。 / Export current preferences.
    Export(PreferencesExportArgs),
    /// 匯入偏好設定 JSON。 / Import preferences from JSON.
    Import(PreferencesImportArgs),
    /// 設定單一偏好。 / Set one preference, e.g. `editor.read_only true`.
    Set(PreferencesSetArgs),
    /// 還原預設偏好。 / Restore the default preferences.
    Reset,
}

#[derive(Args)]
struct PreferencesSetArgs {
    #[arg(value_name = "KEY")]
    key: String,
    #[arg(value_name = "VALUE", allow_hyphen_values = true)]
    value: String,
}

#[derive(Args)]
struct PreferencesExportArgs {
    /// 輸出檔案路徑。 / Destination file path.
    #[arg(long, value_name = "FILE")]
    output: PathBuf,
}

#[derive(Args)]
struct PreferencesImportArgs {
    /// 輸入檔案路徑。 / Source preferences JSON.
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

#[derive(Serialize)]
struct TokenRecord<'a> {
    start: usize,
    end: usize,
    kind: HighlightKind,
    text: &'a str,
}

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<()> {
    let Cli { workspace, command } = Cli::parse();
    let workspace_root = resolve_workspace(workspace)?;
    match command {
        Commands::Files(subcommand) => execute_files_command(subcommand, &workspace_root),
        Commands::Show(args) => show_content(args, &workspace_root),
        Commands::Write(args) => write_content(args, &workspace_root),
        Commands::Highlight(args) => highlight_content(args, &workspace_root),
        Commands::Rules(args) => export_rules(args),
        Commands::Preferences(subcommand) => {
            execute_preferences_command(subcommand, &workspace_root)
        }
    }
}

fn execute_files_command(command: FilesCommand, workspace_root: &Path) -> Result<()> {
    let mut studio = open_studio(workspace_root)?;
    match command {
        FilesCommand::List => {
            print_files(&studio);
        }
        FilesCommand::Add => {
            let id = studio.add_file();
            println!("{id}");
        }
        FilesCommand::Delete(args) => {
            studio.delete_file(&FileId::from(args.id))?;
        }
        FilesCommand::Select(args) => {
            studio.select_file(&FileId::from(args.id))?;
        }
        FilesCommand::Move(args) => {
            let drag = DragEnd::new(args.dragged, args.onto.map(FileId::from));
            studio.apply_drag(&drag)?;
            print_files(&studio);
        }
        FilesCommand::Reorder(args) => {
            studio.reorder(args.ids.into_iter().map(FileId::from).collect())?;
            print_files(&studio);
        }
        FilesCommand::Orphans(args) => {
            let orphans = if args.prune {
                studio.prune_orphans()
            } else {
                studio.orphans()
            };
            for id in orphans {
                println!("{id}");
            }
        }
    }
    Ok(())
}

fn print_files(studio: &Studio<DirectoryStore>) {
    for id in studio.files() {
        let marker = if id == studio.active() { "*" } else { " " };
        println!("{marker} {id}");
    }
}

fn show_content(args: ShowArgs, workspace_root: &Path) -> Result<()> {
    let mut studio = open_studio(workspace_root)?;
    let id = resolve_file(&studio, args.id)?;
    let content = studio.content(&id);
    print!("{content}");
    if !content.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn write_content(args: WriteArgs, workspace_root: &Path) -> Result<()> {
    let preferences = load_preferences(workspace_root)?;
    if preferences.preferences().editor.read_only {
        bail!("workspace is read-only (set editor.read_only to false to allow writes)");
    }
    let mut studio = open_studio_with(workspace_root, &preferences)?;
    let id = resolve_file(&studio, args.id)?;
    let text = match args.from {
        Some(path) => {
            let path = resolve_input_path(&path)?;
            fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            buffer
        }
    };
    studio.set_content(&id, text);
    Ok(())
}

fn highlight_content(args: HighlightArgs, workspace_root: &Path) -> Result<()> {
    let preferences = load_preferences(workspace_root)?;
    let theme = preferences.preferences().theme()?;
    let mut studio = open_studio_with(workspace_root, &preferences)?;
    let id = resolve_file(&studio, args.id)?;

    let mut registry = LanguageRegistry::with_defaults();
    let language = match args.rules {
        Some(path) => {
            let path = resolve_input_path(&path)?;
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let rules = LanguageRules::from_json(&text)
                .with_context(|| format!("invalid rules in {}", path.display()))?;
            registry
                .register_rules(rules)
                .with_context(|| format!("invalid rules in {}", path.display()))?
        }
        None => language_for(&registry, &id),
    };
    let content = studio.content(&id);
    let tokens = language.highlight(content);

    match args.format {
        HighlightFormat::Plain => {
            for token in &tokens {
                println!(
                    "{}..{}\t{}\t{}",
                    token.range.start,
                    token.range.end,
                    token.kind.as_str(),
                    &content[token.range.clone()]
                );
            }
        }
        HighlightFormat::Json => {
            let records: Vec<TokenRecord<'_>> = tokens
                .iter()
                .map(|token| TokenRecord {
                    start: token.range.start,
                    end: token.range.end,
                    kind: token.kind,
                    text: &content[token.range.clone()],
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        HighlightFormat::Ansi => {
            let rendered = render_ansi(content, &tokens, &theme);
            let mut stdout = io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            if !rendered.ends_with('\n') {
                writeln!(stdout)?;
            }
        }
    }
    Ok(())
}

fn language_for<'a>(registry: &'a LanguageRegistry, id: &FileId) -> &'a LanguageDefinition {
    registry
        .for_file_name(id.as_str())
        .unwrap_or_else(|| builtin::upl())
}

fn render_ansi(content: &str, tokens: &[HighlightToken], theme: &Theme) -> String {
    let mut output = String::with_capacity(content.len() * 2);
    let mut cursor = 0;
    for token in tokens {
        output.push_str(&content[cursor..token.range.start]);
        let style = theme.style_for(&token.kind);
        let color = style.foreground;
        output.push_str(&format!("\x1b[38;2;{};{};{}m", color.r, color.g, color.b));
        if style.bold {
            output.push_str("\x1b[1m");
        }
        if style.italic {
            output.push_str("\x1b[3m");
        }
        if style.underline {
            output.push_str("\x1b[4m");
        }
        output.push_str(&content[token.range.clone()]);
        output.push_str("\x1b[0m");
        cursor = token.range.end;
    }
    output.push_str(&content[cursor..]);
    output
}

fn export_rules(args: RulesArgs) -> Result<()> {
    let json = LanguageRules::upl().to_json()?;
    match args.output {
        Some(path) => {
            let path = resolve_input_path(&path)?;
            fs::write(&path, format!("{json}\n"))
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Exported rules to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn execute_preferences_command(command: PreferencesCommand, workspace_root: &Path) -> Result<()> {
    match command {
        PreferencesCommand::Show => show_preferences(workspace_root),
        PreferencesCommand::Export(args) => export_preferences(args, workspace_root),
        PreferencesCommand::Import(args) => import_preferences(args, workspace_root),
        PreferencesCommand::Set(args) => set_preference(args, workspace_root),
        PreferencesCommand::Reset => reset_preferences(workspace_root),
    }
}

fn show_preferences(workspace_root: &Path) -> Result<()> {
    let store = load_preferences(workspace_root)?;
    println!("{}", store.to_json()?);
    Ok(())
}

fn export_preferences(args: PreferencesExportArgs, workspace_root: &Path) -> Result<()> {
    let store = load_preferences(workspace_root)?;
    let output = resolve_input_path(&args.output)?;
    store
        .export_to(&output)
        .with_context(|| format!("failed to export preferences to {}", output.display()))?;
    println!("Exported preferences to {}", output.display());
    Ok(())
}

fn import_preferences(args: PreferencesImportArgs, workspace_root: &Path) -> Result<()> {
    let mut store = load_preferences(workspace_root)?;
    let input = resolve_input_path(&args.input)?;
    if !input.exists() {
        bail!("preferences file '{}' does not exist", input.display());
    }
    store
        .import_from(&input)
        .with_context(|| format!("failed to import preferences from {}", input.display()))?;
    println!("Imported preferences from {}", input.display());
    Ok(())
}

fn set_preference(args: PreferencesSetArgs, workspace_root: &Path) -> Result<()> {
    let mut store = load_preferences(workspace_root)?;
    let key: PreferenceKey = args.key.parse()?;
    store.set(key, &args.value)?;
    println!("{} = {}", key.name(), args.value);
    Ok(())
}

fn reset_preferences(workspace_root: &Path) -> Result<()> {
    let mut store = load_preferences(workspace_root)?;
    store.overwrite(Default::default())?;
    println!("Restored default preferences");
    Ok(())
}

fn open_studio(workspace_root: &Path) -> Result<Studio<DirectoryStore>> {
    let preferences = load_preferences(workspace_root)?;
    open_studio_with(workspace_root, &preferences)
}

fn open_studio_with(
    workspace_root: &Path,
    preferences: &PreferencesStore,
) -> Result<Studio<DirectoryStore>> {
    let store = DirectoryStore::new(storage_dir(workspace_root));
    Ok(Studio::open(store, &preferences.preferences().workspace))
}

fn load_preferences(workspace_root: &Path) -> Result<PreferencesStore> {
    let prefs_path = preferences_path(workspace_root);
    PreferencesStore::load(&prefs_path)
        .with_context(|| format!("failed to load preferences from {}", prefs_path.display()))
}

fn resolve_file(studio: &Studio<DirectoryStore>, id: Option<String>) -> Result<FileId> {
    match id {
        Some(id) => {
            let id = FileId::from(id);
            if !studio.workspace().contains(&id) {
                bail!("file '{id}' is not part of the workspace");
            }
            Ok(id)
        }
        None => Ok(studio.active().clone()),
    }
}

fn storage_dir(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".uplstudio").join("storage")
}

fn preferences_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".uplstudio").join("preferences.json")
}

fn resolve_workspace(workspace: Option<PathBuf>) -> Result<PathBuf> {
    match workspace {
        Some(path) => {
            if path.is_absolute() {
                Ok(path)
            } else {
                Ok(std::env::current_dir()
                    .context("determine current directory")?
                    .join(path))
            }
        }
        None => std::env::current_dir().context("determine current directory"),
    }
}

fn resolve_input_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("determine current directory")?
            .join(path))
    }
}
