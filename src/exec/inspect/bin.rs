use std::{env, fs, path::PathBuf, process, sync::Arc};

use kura::{ArchiveView, AssetId, AssetIndex, Decoder, HueTable, Location, TABLE_MAGIC, TableLayout};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "kura_inspect".to_string());

    let rest: Vec<String> = args.collect();
    if rest.is_empty() {
        print_usage(&program);
        return Err("missing archive table path".to_string());
    }

    let mut path: Option<PathBuf> = None;
    let mut data: Vec<PathBuf> = Vec::new();
    let mut hues: Option<PathBuf> = None;
    let mut entry_to_dump: Option<AssetId> = None;
    let mut hex_limit: usize = 256;
    let mut decode_all = false;
    let mut show_invalid = false;

    let mut iter = rest.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage(&program);
                return Ok(());
            }
            "--data" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--data requires a file path".to_string())?;
                data.push(PathBuf::from(value));
            }
            "--hues" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--hues requires a file path".to_string())?;
                hues = Some(PathBuf::from(value));
            }
            "--id" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--id requires an asset id".to_string())?;
                entry_to_dump = Some(
                    value
                        .parse::<AssetId>()
                        .map_err(|_| "--id expects a non-negative integer".to_string())?,
                );
            }
            "--limit" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--limit requires a byte count".to_string())?;
                hex_limit = value
                    .parse::<usize>()
                    .map_err(|_| "--limit expects a positive integer".to_string())?;
            }
            "--decode" => decode_all = true,
            "--all" => show_invalid = true,
            _ => {
                if path.is_none() {
                    path = Some(PathBuf::from(arg));
                } else {
                    print_usage(&program);
                    return Err(format!("unexpected argument: {arg}"));
                }
            }
        }
    }

    let Some(path) = path else {
        print_usage(&program);
        return Err("missing archive table path".to_string());
    };

    let table =
        ArchiveView::open(&path).map_err(|err| format!("failed to open {}: {err}", path.display()))?;
    let header = table
        .header(TABLE_MAGIC)
        .map_err(|err| format!("failed to read header of {}: {err}", path.display()))?;

    let parts = data
        .iter()
        .map(|p| ArchiveView::open(p).map_err(|err| format!("failed to open {}: {err}", p.display())))
        .collect::<Result<Vec<_>, _>>()?;

    let index = AssetIndex::load(&table, &parts)
        .map_err(|err| format!("failed to load index of {}: {err}", path.display()))?;

    println!("File: {}", path.display());
    if let Ok(meta) = fs::metadata(&path) {
        println!("Size: {} bytes", meta.len());
    }
    println!("Version: {}", header.version);
    println!("Layout: {:?}", index.layout());
    println!("Entries: {} declared, {} valid", header.entry_count, index.iter().filter(|(_, e)| e.is_valid()).count());
    for (i, part) in parts.iter().enumerate() {
        println!("Data file {i}: {} ({} bytes)", part.path().display(), part.len());
    }

    let rows: Vec<_> = index
        .iter()
        .filter(|(_, entry)| show_invalid || entry.is_valid())
        .collect();
    if rows.is_empty() {
        println!("(no entries)");
    } else {
        println!(
            "\n{:>8}  {:<18}  {:>10}  {:>10}  {:>9}  {:>6}  {:>5}  {:>5}",
            "Id", "Location", "Raw", "Unpacked", "Size", "Hue", "Anim", "Flags"
        );
        println!(
            "{:->8}  {:-<18}  {:->10}  {:->10}  {:->9}  {:->6}  {:->5}  {:->5}",
            "", "", "", "", "", "", "", ""
        );

        for (id, entry) in &rows {
            println!(
                "{:>8}  {:<18}  {:>10}  {:>10}  {:>9}  {:>#6x}  {:>5}  {:>#5x}",
                id,
                location(&entry.location),
                entry.raw_length,
                entry.decompressed_length,
                format!("{}x{}", entry.width, entry.height),
                entry.hue,
                entry.animation_offset,
                entry.flags,
            );
        }

        let total_bytes: u64 = rows.iter().map(|(_, entry)| entry.raw_length as u64).sum();
        println!("\nTotal payload bytes: {total_bytes}");
    }

    let hue_table = match hues {
        Some(p) => {
            let view = ArchiveView::open(&p).map_err(|err| format!("failed to open {}: {err}", p.display()))?;
            let table = HueTable::load(&view).map_err(|err| format!("failed to load hues: {err}"))?;
            println!("Hues: {} records", table.len());
            Some(Arc::new(table))
        }
        None => None,
    };

    let sources = match index.layout() {
        TableLayout::Flat => vec![table.clone()],
        TableLayout::MultiPart => parts.clone(),
    };
    let decoder = Decoder::new(sources, hue_table);

    if decode_all {
        let mut corrupt = 0usize;
        for (id, entry) in index.iter().filter(|(_, entry)| entry.is_valid()) {
            if let Err(err) = decoder.decode(id, entry) {
                corrupt += 1;
                println!("  {id}: {err}");
            }
        }
        println!("\nDecoded {} entries, {corrupt} failed", decoder.decode_count());
    }

    if let Some(id) = entry_to_dump {
        let entry = index
            .entry(id)
            .copied()
            .ok_or_else(|| format!("id {id} is outside the index"))?;

        println!("\nEntry: {id}");
        println!("  Valid: {}", entry.is_valid());
        println!("  Location: {}", location(&entry.location));
        println!("  Raw length: {} bytes", entry.raw_length);
        println!("  Decompressed length: {} bytes", entry.decompressed_length);
        println!("  Size: {}x{}", entry.width, entry.height);
        println!("  Hue: {:#06x}", entry.hue);
        println!("  Compression: {:?}", entry.compression());
        println!("  Encoding: {:?}", entry.encoding());
        if entry.is_animated() {
            let frames: Vec<AssetId> = (0..8).map_while(|n| index.frame(id, n)).collect();
            println!("  Animation frames: {frames:?}");
        }

        if entry.is_valid() {
            match decoder.decode(id, &entry) {
                Ok(pixels) => println!("  Decoded: {}x{}", pixels.width(), pixels.height()),
                Err(err) => println!("  Decode failed: {err}"),
            }

            let source = match index.layout() {
                TableLayout::Flat => Some(&table),
                TableLayout::MultiPart => parts.get(entry.location.file_id()),
            };
            if let Some(source) = source {
                let bytes = source
                    .read(entry.location.position(), entry.raw_length as u64)
                    .map_err(|err| format!("unable to read entry {id}: {err}"))?;
                println!("\nStored words (showing up to {hex_limit} bytes):");
                dump_words(entry.location.position(), bytes, hex_limit);
            }
        }
    }

    Ok(())
}

fn print_usage(program: &str) {
    println!(
        "Usage: {program} <TABLE_FILE> [--data <FILE>]... [--hues <FILE>] [--id <ID>] [--limit <BYTES>] [--decode] [--all]"
    );
    println!("\nOptions:");
    println!("  --data <FILE>    Data file of a multi-part archive, in file id order");
    println!("  --hues <FILE>    Hue table used when decoding");
    println!("  --id <ID>        Inspect a specific entry and dump its stored words");
    println!("  --limit <BYTES>  Limit the number of stored bytes shown (default 256)");
    println!("  --decode         Decode every valid entry and report failures");
    println!("  --all            List invalid entries as well");
    println!("  -h, --help       Show this help message");
}

fn location(location: &Location) -> String {
    match location {
        Location::Flat { offset } => format!("@{offset}"),
        Location::Part {
            file_id,
            block_id,
            position,
        } => format!("{file_id}:{block_id}@{position}"),
    }
}

/// Prints stored bytes as little-endian 16-bit words, eight per line, keyed
/// by their absolute position in the archive.
fn dump_words(base: u64, data: &[u8], limit: usize) {
    let shown = &data[..data.len().min(limit)];

    for (line, chunk) in shown.chunks(16).enumerate() {
        let words: Vec<String> = chunk
            .chunks(2)
            .map(|pair| match pair {
                [lo, hi] => format!("{:04X}", u16::from_le_bytes([*lo, *hi])),
                [odd] => format!("{odd:02X}"),
                _ => String::new(),
            })
            .collect();
        println!("{:010X}: {}", base + (line * 16) as u64, words.join(" "));
    }

    if shown.len() < data.len() {
        println!("... {} more bytes", data.len() - shown.len());
    }
}
