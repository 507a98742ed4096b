//! `liveview translate`: rewrites a frame sequence file the way an observer sees it.

use std::io::{self, Write};
use std::path::PathBuf;

use liveview_core::{
    translate, validate, Frame, LiveViewError, RenderMode, TranslationContext, UnitType,
};
use tracing::info;

use crate::error::{read_json, Result};

pub struct TranslateArgs {
    pub file: PathBuf,
    pub session_id: String,
    pub unit_id: u32,
    pub unit_type: Option<String>,
    pub diagnostic: bool,
    pub text: bool,
}

pub fn run(args: TranslateArgs) -> Result<()> {
    let frames: Vec<Frame> = read_json(&args.file)?;
    validate(&frames).map_err(LiveViewError::from)?;

    let ctx = TranslationContext::new(
        args.session_id,
        args.unit_id,
        args.unit_type.map(UnitType::new),
    );
    let mode = RenderMode::from_diagnostic(args.diagnostic);
    let output = translate(&frames, &ctx, mode).map_err(LiveViewError::from)?;
    info!(
        input_frames = frames.len(),
        output_frames = output.len(),
        mode = ?mode,
        "Translated frame sequence"
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.text {
        write_listing(&mut out, &output)?;
    } else {
        serde_json::to_writer_pretty(&mut out, &output).map_err(|source| LiveViewError::Json {
            context: "writing translated frames".to_string(),
            source,
        })?;
        writeln!(out)?;
    }
    Ok(())
}

/// One frame per line, indented by nesting depth.
fn write_listing<W: Write>(out: &mut W, frames: &[Frame]) -> io::Result<()> {
    let mut open_ends: Vec<usize> = Vec::new();
    for (index, frame) in frames.iter().enumerate() {
        while open_ends.last().is_some_and(|end| *end <= index) {
            open_ends.pop();
        }
        writeln!(out, "{:>4}  {}{}", index, "  ".repeat(open_ends.len()), frame)?;
        if let Some(length) = frame.subtree_length() {
            open_ends.push(index + length);
        }
    }
    Ok(())
}
