//! CLI for the refactor-engine tool.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use refactor_engine::prelude::*;
use refactor_engine::span::Position;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "refactor")]
#[command(author, version, about = "Semantic refactorings for Java source trees", long_about = None)]
struct Cli {
    /// Workspace root
    #[arg(short = 'C', long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Log more (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every refactoring command.
#[derive(Args)]
struct ApplyArgs {
    /// Print the diff without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Apply even when blocking conflicts were found
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct StaticArgs {
    /// Pass the instance under this name and each --field separately
    #[arg(long)]
    class_parameter: Option<String>,

    /// Instance field used by the body (repeatable)
    #[arg(long = "field")]
    fields: Vec<String>,

    /// Parameter name, parallel to --field; names the instance without
    /// --class-parameter
    #[arg(long = "name")]
    names: Vec<String>,

    /// Leave call sites untouched
    #[arg(long)]
    keep_usages: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rename a declaration and its references
    Rename {
        /// Declaration path: pkg.Class, pkg.Class#member or pkg.Class#member/arity
        target: String,

        /// New simple name (or dotted name for packages)
        new_name: String,

        /// Do not rename occurrences in comments
        #[arg(long)]
        skip_comments: bool,

        /// Do not rename occurrences in non-source files
        #[arg(long)]
        skip_non_source: bool,

        #[command(flatten)]
        apply: ApplyArgs,
    },

    /// Move classes or packages to another package
    MoveClass {
        /// Classes or packages to move
        #[arg(required = true)]
        elements: Vec<String>,

        /// Destination package
        #[arg(long)]
        to: String,

        /// Put every moved file under this source root
        #[arg(long)]
        source_root: Option<PathBuf>,

        #[command(flatten)]
        apply: ApplyArgs,
    },

    /// Move static members to another class
    MoveMembers {
        /// Members to move
        #[arg(required = true)]
        members: Vec<String>,

        /// Qualified name of the target class
        #[arg(long)]
        to: String,

        /// Visibility of the moved members
        #[arg(long)]
        visibility: Option<String>,

        /// Turn matching constants into enum constants
        #[arg(long)]
        enum_constants: bool,

        #[command(flatten)]
        apply: ApplyArgs,
    },

    /// Turn an inner class into a top-level class
    MoveInner {
        inner: String,
        new_name: String,

        /// Pass the outer instance to the new class
        #[arg(long)]
        pass_outer: bool,

        /// Name of the outer-instance field and parameter
        #[arg(long)]
        parameter: Option<String>,

        #[command(flatten)]
        apply: ApplyArgs,
    },

    /// Make an instance method static
    MakeStatic {
        method: String,

        #[command(flatten)]
        settings: StaticArgs,

        #[command(flatten)]
        apply: ApplyArgs,
    },

    /// Make an inner class static
    MakeClassStatic {
        class: String,

        #[command(flatten)]
        settings: StaticArgs,

        #[command(flatten)]
        apply: ApplyArgs,
    },

    /// Move a static method into the class of one of its parameters
    ConvertToInstance {
        method: String,

        /// Name of the parameter that becomes the receiver
        parameter: String,

        #[command(flatten)]
        apply: ApplyArgs,
    },

    /// Use a supertype wherever a class is referenced
    RefsToSuper {
        class: String,
        super_class: String,

        /// Also retarget instanceof checks
        #[arg(long)]
        instance_of: bool,

        #[command(flatten)]
        apply: ApplyArgs,
    },

    /// Replace constructor calls with a static factory method
    Factory {
        /// A constructor, or a class with an implicit constructor
        element: String,

        /// Factory method name
        #[arg(long)]
        name: String,

        /// Class receiving the factory (defaults to the constructed class)
        #[arg(long)]
        target: Option<String>,

        /// Downgrade the constructor to this visibility
        #[arg(long)]
        hide_constructor: Option<String>,

        #[command(flatten)]
        apply: ApplyArgs,
    },

    /// Generify raw collection types from their casts
    TypeCook {
        #[arg(required = true)]
        elements: Vec<String>,

        #[arg(long)]
        drop_casts: bool,

        #[arg(long)]
        leave_objects_raw: bool,

        #[arg(long)]
        preserve_raw_arrays: bool,

        #[arg(long)]
        exhaustive: bool,

        #[arg(long)]
        cook_objects: bool,

        #[arg(long)]
        wildcards: bool,

        #[command(flatten)]
        apply: ApplyArgs,
    },

    /// List indexed declarations
    Index {
        /// Only declarations whose qualified name contains this text
        filter: Option<String>,

        /// Include locals and parameters
        #[arg(long)]
        locals: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let engine = Engine::open(&cli.workspace)
        .with_context(|| format!("Failed to index {}", cli.workspace.display()))?;

    match cli.command {
        Commands::Rename {
            target,
            new_name,
            skip_comments,
            skip_non_source,
            apply,
        } => {
            let target = resolve(&engine, &target)?;
            let factory = engine.factory();
            let handle = if skip_comments || skip_non_source {
                let settings = engine.settings();
                factory.create_rename_with_options(
                    target,
                    &new_name,
                    settings.search_in_comments && !skip_comments,
                    settings.search_in_non_source_files && !skip_non_source,
                )
            } else {
                factory.create_rename(target, &new_name)
            };
            run(handle.context("Rename failed")?, &apply)
        }
        Commands::MoveClass {
            elements,
            to,
            source_root,
            apply,
        } => {
            let elements = resolve_all(&engine, &elements)?;
            let factory = engine.factory();
            let destination = match source_root {
                Some(root) => factory
                    .create_source_root_move_destination(&to, root)
                    .context("Invalid destination")?,
                None => factory.create_source_folder_preserving_move_destination(&to),
            };
            let handle = factory
                .create_move_classes_or_packages(elements, destination)
                .context("Move failed")?;
            run(handle, &apply)
        }
        Commands::MoveMembers {
            members,
            to,
            visibility,
            enum_constants,
            apply,
        } => {
            let members = resolve_all(&engine, &members)?;
            let handle = engine
                .factory()
                .create_move_members_with_enum_constants(
                    members,
                    &to,
                    visibility.as_deref(),
                    enum_constants,
                )
                .context("Move members failed")?;
            run(handle, &apply)
        }
        Commands::MoveInner {
            inner,
            new_name,
            pass_outer,
            parameter,
            apply,
        } => {
            let inner = resolve(&engine, &inner)?;
            let handle = engine
                .factory()
                .create_move_inner(inner, &new_name, pass_outer, parameter.as_deref())
                .context("Move inner class failed")?;
            run(handle, &apply)
        }
        Commands::MakeStatic {
            method,
            settings,
            apply,
        } => {
            let method = resolve(&engine, &method)?;
            let (fields, names) = settings.lists();
            let handle = engine
                .factory()
                .create_make_method_static(
                    method,
                    !settings.keep_usages,
                    settings.class_parameter.as_deref(),
                    &fields,
                    &names,
                )
                .context("Make static failed")?;
            run(handle, &apply)
        }
        Commands::MakeClassStatic {
            class,
            settings,
            apply,
        } => {
            let class = resolve(&engine, &class)?;
            let (fields, names) = settings.lists();
            let handle = engine
                .factory()
                .create_make_class_static(
                    class,
                    !settings.keep_usages,
                    settings.class_parameter.as_deref(),
                    &fields,
                    &names,
                )
                .context("Make class static failed")?;
            run(handle, &apply)
        }
        Commands::ConvertToInstance {
            method,
            parameter,
            apply,
        } => {
            let method = resolve(&engine, &method)?;
            let Some(param) = engine
                .index()
                .parameters(method)
                .into_iter()
                .find(|p| p.name == parameter)
                .map(|p| p.id)
            else {
                bail!("{} has no parameter '{}'", engine.index().describe(method), parameter);
            };
            let handle = engine
                .factory()
                .create_convert_to_instance_method(method, param)
                .context("Convert to instance method failed")?;
            run(handle, &apply)
        }
        Commands::RefsToSuper {
            class,
            super_class,
            instance_of,
            apply,
        } => {
            let class = resolve(&engine, &class)?;
            let super_class = resolve(&engine, &super_class)?;
            let handle = engine
                .factory()
                .create_turn_refs_to_super(class, super_class, instance_of)
                .context("Turn references to super failed")?;
            run(handle, &apply)
        }
        Commands::Factory {
            element,
            name,
            target,
            hide_constructor,
            apply,
        } => {
            let id = resolve(&engine, &element)?;
            let decl = engine.index().get(id)?;
            let (source, class) = if decl.kind == DeclarationKind::Constructor {
                let class = decl.container.context("Constructor without a class")?;
                (FactorySource::Constructor(id), class)
            } else {
                (FactorySource::Class(id), id)
            };
            let target = match target {
                Some(target) => target,
                None => engine.index().get(class)?.qualified_name.clone(),
            };
            let handle = match hide_constructor {
                Some(visibility) => {
                    let Some(visibility) = Visibility::parse(&visibility) else {
                        bail!("Unknown visibility '{}'", visibility);
                    };
                    let target = resolve(&engine, &target)?;
                    engine.plan(
                        ReplaceConstructorWithFactory::new(source, target, name.as_str())
                            .with_policy(ConstructorPolicy::Downgrade(visibility)),
                    )
                }
                None => match source {
                    FactorySource::Constructor(id) => engine
                        .factory()
                        .create_replace_constructor_with_factory(id, &target, &name),
                    FactorySource::Class(id) => engine
                        .factory()
                        .create_replace_constructor_with_factory_for_class(id, &target, &name),
                },
            };
            run(handle.context("Replace constructor with factory failed")?, &apply)
        }
        Commands::TypeCook {
            elements,
            drop_casts,
            leave_objects_raw,
            preserve_raw_arrays,
            exhaustive,
            cook_objects,
            wildcards,
            apply,
        } => {
            let elements = resolve_all(&engine, &elements)?;
            let options = CookOptions {
                drop_obsolete_casts: drop_casts,
                leave_objects_raw,
                preserve_raw_arrays,
                exhaustive,
                cook_objects,
                cook_to_wildcards: wildcards,
            };
            let handle = engine
                .factory()
                .create_type_cook(elements, options)
                .context("Type cook failed")?;
            run(handle, &apply)
        }
        Commands::Index { filter, locals } => cmd_index(&engine, filter.as_deref(), locals),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

impl StaticArgs {
    fn lists(&self) -> (Vec<&str>, Vec<&str>) {
        (
            self.fields.iter().map(String::as_str).collect(),
            self.names.iter().map(String::as_str).collect(),
        )
    }
}

fn resolve(engine: &Engine, path: &str) -> Result<DeclarationId> {
    engine
        .index()
        .resolve(path)
        .with_context(|| format!("Cannot resolve '{}'", path))
}

fn resolve_all(engine: &Engine, paths: &[String]) -> Result<Vec<DeclarationId>> {
    paths.iter().map(|p| resolve(engine, p)).collect()
}

fn run(mut handle: RefactoringHandle, args: &ApplyArgs) -> Result<()> {
    for conflict in handle.find_conflicts() {
        eprintln!("{}", conflict);
    }

    if args.dry_run {
        println!("{}", handle.diff(true)?);
        println!("\n{}", handle.summary()?);
        return Ok(());
    }

    if args.force {
        handle.override_conflicts();
    }
    let name = handle.name();
    let report = handle
        .apply()
        .with_context(|| format!("{} was not applied", name))?;
    println!("Modified {} file(s)", report.files_changed());
    Ok(())
}

fn cmd_index(engine: &Engine, filter: Option<&str>, locals: bool) -> Result<()> {
    let index = engine.index();
    for decl in index.declarations() {
        if decl.kind.is_local() && !locals {
            continue;
        }
        if filter.is_some_and(|f| !decl.qualified_name.contains(f)) {
            continue;
        }
        let position = engine
            .storage()
            .read(&decl.file)
            .map(|text| Position::of_offset(&text, decl.name_range.start).to_string())
            .unwrap_or_default();
        let arity = decl.arity.map(|n| format!("/{}", n)).unwrap_or_default();
        println!(
            "{:<12} {}{} {}:{}",
            decl.kind.name(),
            decl.qualified_name,
            arity,
            decl.file.display(),
            position
        );
    }
    let stats = index.stats();
    println!(
        "\n{} file(s), {} declaration(s), {} reference(s)",
        stats.files, stats.declarations, stats.references
    );
    Ok(())
}
