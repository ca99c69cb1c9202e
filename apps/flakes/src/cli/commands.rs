//! CLI command implementations.

use crate::config::FlakesConfig;
use flakes_core::harness::{self, HarnessOptions, RunMode};
use flakes_core::primitives::MAX_SAVE_SIZE;
use flakes_core::{
    Flake, Flakes, FlakesError, ObjectId, ObjectStore, SaveGame, World, compute_blake3_hash,
};
use std::path::{Path, PathBuf};

/// Settings shared by every command.
#[derive(Debug)]
pub struct Context {
    pub flakes: Flakes,
    pub config: FlakesConfig,
    pub json_mode: bool,
    pub verbose: bool,
    /// Provider named on the command line, if any.
    pub only_provider: Option<String>,
}

// =============================================================================
// FILE VALIDATION
// =============================================================================

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), FlakesError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| FlakesError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(FlakesError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and make sure it names a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, FlakesError> {
    let canonical = path.canonicalize().map_err(|e| {
        FlakesError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(FlakesError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent directory of an output path.
fn validate_output_path(path: &Path) -> Result<PathBuf, FlakesError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        FlakesError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(FlakesError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| FlakesError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read a save-game file after path and size checks.
fn read_save_file(input: &Path) -> Result<Vec<u8>, FlakesError> {
    let validated = validate_file_path(input)?;
    validate_file_size(&validated, MAX_SAVE_SIZE as u64)?;
    std::fs::read(&validated).map_err(|e| FlakesError::IoError(format!("Read file: {}", e)))
}

fn print_json(value: &serde_json::Value) -> Result<(), FlakesError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| FlakesError::SerializationError(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// PROVIDERS COMMAND
// =============================================================================

/// List registered providers.
pub fn cmd_providers(ctx: &Context) -> Result<(), FlakesError> {
    let names = ctx.flakes.registry().names();

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "providers": names,
            "default": ctx.flakes.provider(),
        }))?;
        return Ok(());
    }

    println!("Serialization Providers");
    println!("=======================");
    for name in &names {
        let marker = if name == ctx.flakes.provider() { " (default)" } else { "" };
        println!("  {}{}", name, marker);
    }

    Ok(())
}

// =============================================================================
// SELFTEST COMMAND
// =============================================================================

/// Round-trip the samples and fail if any case differs.
pub fn cmd_selftest(
    ctx: &Context,
    raw_only: bool,
    compressed_only: bool,
    children: usize,
) -> Result<(), FlakesError> {
    let modes = match (raw_only, compressed_only) {
        (true, _) => vec![RunMode::Raw],
        (_, true) => vec![RunMode::Compressed],
        _ => RunMode::ALL.to_vec(),
    };
    let options = HarnessOptions {
        providers: ctx.only_provider.iter().cloned().collect(),
        modes,
        compression: ctx.config.compression,
        policy: ctx.config.ownership.policy,
        children,
    };
    let report = harness::run(ctx.flakes.registry(), &options)?;

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "passed": report.passed(),
            "failed": report.failed(),
            "cases": report.cases,
        }))?;
    } else {
        println!("Flakes Self-Test");
        println!("================");
        for case in &report.cases {
            if case.passed && !ctx.verbose {
                continue;
            }
            let status = if case.passed { "ok  " } else { "FAIL" };
            let mode = format!("{:?}", case.mode);
            println!(
                "  [{}] {:<10} {:<10} {:<14} {:>7} bytes {}",
                status,
                case.provider,
                mode,
                case.sample,
                case.payload_bytes,
                case.error.as_deref().unwrap_or_default()
            );
        }
        println!();
        println!("Passed: {}", report.passed());
        println!("Failed: {}", report.failed());
    }

    if report.all_passed() {
        Ok(())
    } else {
        Err(FlakesError::SerializationError(format!(
            "{} of {} round trips failed",
            report.failed(),
            report.cases.len()
        )))
    }
}

// =============================================================================
// SAVE COMMAND
// =============================================================================

/// Build the sample graph and save its complex object.
pub fn cmd_save(ctx: &Context, output: &Path, children: usize) -> Result<(), FlakesError> {
    let validated_output = validate_output_path(output)?;

    let mut world = World::new(harness::sample_types()?);
    let samples = harness::build_samples(&mut world, children)?;

    let mut save = SaveGame::default();
    save.set_object_to_save(&ctx.flakes, &world, samples.complex)?;
    let data = save.to_bytes()?;

    std::fs::write(&validated_output, &data)
        .map_err(|e| FlakesError::IoError(format!("Write file: {}", e)))?;
    tracing::info!(path = %validated_output.display(), bytes = data.len(), "save written");

    let type_path = save.flake.type_path.as_ref().map(ToString::to_string).unwrap_or_default();
    if ctx.json_mode {
        print_json(&serde_json::json!({
            "path": validated_output.to_string_lossy(),
            "provider": save.provider,
            "compressed": save.compressed,
            "type_path": type_path,
            "objects": world.objects_within(samples.complex).len() + 1,
            "bytes": data.len(),
        }))?;
        return Ok(());
    }

    println!("Saved {} bytes to {:?}", data.len(), validated_output);
    println!("  Provider:   {}", save.provider);
    println!("  Compressed: {}", save.compressed);
    println!("  Type:       {}", type_path);

    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// Validate a save file and print its header.
pub fn cmd_inspect(ctx: &Context, input: &Path) -> Result<(), FlakesError> {
    let data = read_save_file(input)?;
    let (header, body) = SaveGame::read_header(&data)?;
    let flake = Flake::from_bytes(body)?;
    let type_path = flake.type_path.as_ref().map(ToString::to_string).unwrap_or_default();
    let blake3 = compute_blake3_hash(&data);

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "magic": String::from_utf8_lossy(&header.magic),
            "version": header.version,
            "provider": header.provider,
            "compressed": header.compressed,
            "checksum": header.checksum,
            "type_path": type_path,
            "payload_bytes": flake.data.len(),
            "file_bytes": data.len(),
            "blake3": blake3,
        }))?;
        return Ok(());
    }

    println!("Flakes Save File");
    println!("================");
    println!("Magic:      {}", String::from_utf8_lossy(&header.magic));
    println!("Version:    {}", header.version);
    println!("Provider:   {}", header.provider);
    println!("Compressed: {}", header.compressed);
    println!("Checksum:   {}", header.checksum);
    println!("Type:       {}", type_path);
    println!("Payload:    {} bytes", flake.data.len());
    println!("File:       {} bytes", data.len());
    println!("BLAKE3:     {}", blake3);

    Ok(())
}

// =============================================================================
// LOAD COMMAND
// =============================================================================

fn tree_json(world: &World, id: ObjectId) -> serde_json::Value {
    let record = world.record(id);
    serde_json::json!({
        "name": record.map(|r| r.name.as_str()).unwrap_or_default(),
        "class": record.map(|r| r.class.to_string()).unwrap_or_default(),
        "fields": record.map(|r| r.fields.len()).unwrap_or_default(),
        "children": world
            .children_of(id)
            .into_iter()
            .map(|child| tree_json(world, child))
            .collect::<Vec<_>>(),
    })
}

fn print_tree(world: &World, id: ObjectId, depth: usize, verbose: bool) {
    if let Some(record) = world.record(id) {
        let indent = "  ".repeat(depth + 1);
        if verbose {
            println!("{}{} ({}, {} fields)", indent, record.name, record.class.short_name(), record.fields.len());
        } else {
            println!("{}{} ({})", indent, record.name, record.class.short_name());
        }
    }
    for child in world.children_of(id) {
        print_tree(world, child, depth + 1, verbose);
    }
}

/// Rebuild the saved object into a fresh world and print its tree.
pub fn cmd_load(ctx: &Context, input: &Path) -> Result<(), FlakesError> {
    let data = read_save_file(input)?;
    let save = SaveGame::from_bytes(&data)?;

    let mut world = World::new(harness::sample_types()?);
    let root = save.load_object(&ctx.flakes, &mut world, None)?;
    let path = world.path_of(root)?;
    let objects = world.objects_within(root).len() + 1;

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "provider": save.provider,
            "path": path.as_str(),
            "objects": objects,
            "tree": tree_json(&world, root),
        }))?;
        return Ok(());
    }

    println!("Loaded {} ({} objects, provider {})", path, objects, save.provider);
    print_tree(&world, root, 0, ctx.verbose);

    Ok(())
}

// =============================================================================
// CONFIG COMMAND
// =============================================================================

/// Print the effective configuration.
pub fn cmd_config(ctx: &Context) -> Result<(), FlakesError> {
    let config = &ctx.config;
    let source = config
        .source
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<defaults>".to_string());

    if ctx.json_mode {
        let mut output = serde_json::to_value(config)
            .map_err(|e| FlakesError::SerializationError(e.to_string()))?;
        if let Some(map) = output.as_object_mut() {
            map.insert("source".to_string(), serde_json::Value::String(source));
        }
        print_json(&output)?;
        return Ok(());
    }

    println!("Flakes Configuration");
    println!("====================");
    println!("Source:           {}", source);
    println!("Default provider: {}", config.default_provider);
    println!("Compressor:       {}", config.compression.compressor.name());
    println!("Level:            {:?}", config.compression.level);
    println!("Post-load:        {}", config.write.post_load);
    println!("Ownership policy: {:?}", config.ownership.policy);

    Ok(())
}
