use std::fs;
use std::fs::File;
use std::fmt;
use regex::Regex;
use once_cell::sync::Lazy;
use anyhow::{Result, Context};
use std::io::Write;
use std::path::{Path, PathBuf};
use log::{debug, warn};

use crate::errors::SubtitleError;

// @module: SRT reading and writing

// @const: SRT timestamp regex
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2})[,.](\d{3})").unwrap()
});

// @struct: Single subtitle entry
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleEntry {
    // @field: Sequence number
    pub seq_num: usize,

    // @field: Start time in ms
    pub start_time_ms: u64,

    // @field: End time in ms
    pub end_time_ms: u64,

    // @field: Subtitle text, empty for pure timing gaps
    pub text: String,
}

impl SubtitleEntry {
    /// Creates a new subtitle entry
    pub fn new(seq_num: usize, start_time_ms: u64, end_time_ms: u64, text: String) -> Self {
        SubtitleEntry {
            seq_num,
            start_time_ms,
            end_time_ms,
            text,
        }
    }

    /// Convert start time to formatted SRT timestamp
    pub fn format_start_time(&self) -> String {
        Self::format_timestamp(self.start_time_ms)
    }

    /// Convert end time to formatted SRT timestamp
    pub fn format_end_time(&self) -> String {
        Self::format_timestamp(self.end_time_ms)
    }

    /// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
    pub fn format_timestamp(ms: u64) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.seq_num)?;
        writeln!(f, "{} --> {}", self.format_start_time(), self.format_end_time())?;
        if !self.text.is_empty() {
            writeln!(f, "{}", self.text)?;
        }
        writeln!(f)
    }
}

/// Entry being assembled while parsing
struct PartialEntry {
    block: usize,
    seq_num: usize,
    times: Option<(u64, u64)>,
    text: String,
}

/// Collection of subtitle entries with metadata
#[derive(Debug, Clone)]
pub struct SubtitleCollection {
    /// Source filename
    pub source_file: PathBuf,

    /// List of subtitle entries
    pub entries: Vec<SubtitleEntry>,
}

impl SubtitleCollection {
    /// Read an SRT file
    pub fn read_srt<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read subtitle file: {}", path.display()))?;
        let entries = Self::parse_srt_string(&content)
            .with_context(|| format!("Failed to parse subtitle file: {}", path.display()))?;

        debug!("Read {} subtitle entries from {}", entries.len(), path.display());
        Ok(SubtitleCollection {
            source_file: path.to_path_buf(),
            entries,
        })
    }

    /// Source text of every entry, in order
    pub fn source_texts(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.text.clone()).collect()
    }

    /// Copy of this collection with the text of each entry replaced
    ///
    /// Entries without a translation keep their original text.
    pub fn with_translations(&self, translations: &[String]) -> SubtitleCollection {
        let entries = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| SubtitleEntry {
                text: translations.get(i).cloned().unwrap_or_else(|| entry.text.clone()),
                ..entry.clone()
            })
            .collect();

        SubtitleCollection {
            source_file: self.source_file.clone(),
            entries,
        }
    }

    /// Default output path: `<dir>/<stem>.<language>.srt`
    pub fn translated_path(&self, target_language: &str) -> PathBuf {
        let stem = self
            .source_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "subtitles".to_string());
        let suffix: String = target_language
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();

        self.source_file.with_file_name(format!("{}.{}.srt", stem, suffix))
    }

    /// Write subtitles to an SRT file
    pub fn write_to_srt<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = File::create(path)
            .with_context(|| format!("Failed to create subtitle file: {}", path.display()))?;

        for entry in &self.entries {
            write!(file, "{}", entry)?;
        }

        Ok(())
    }

    /// Parse SRT format string into subtitle entries
    ///
    /// Entries with no text lines are kept with empty text.
    pub fn parse_srt_string(content: &str) -> std::result::Result<Vec<SubtitleEntry>, SubtitleError> {
        let content = content.trim_start_matches('\u{feff}');
        let mut entries = Vec::new();
        let mut current: Option<PartialEntry> = None;
        let mut block = 0;

        for (line_number, line) in content.lines().enumerate() {
            let trimmed = line.trim();

            if trimmed.is_empty() {
                if let Some(partial) = current.take() {
                    entries.push(Self::finish_entry(partial)?);
                }
                continue;
            }

            match current.as_mut() {
                None => match trimmed.parse::<usize>() {
                    Ok(seq_num) => {
                        block += 1;
                        current = Some(PartialEntry { block, seq_num, times: None, text: String::new() });
                    }
                    Err(_) => {
                        warn!("Unexpected text at line {} before sequence number: {}", line_number + 1, trimmed);
                    }
                },
                Some(partial) if partial.times.is_none() => {
                    let caps = TIMESTAMP_REGEX.captures(trimmed).ok_or_else(|| SubtitleError::Malformed {
                        block: partial.block,
                        message: format!("expected a timestamp line, found \"{}\"", trimmed),
                    })?;
                    partial.times = Some((Self::parse_timestamp_to_ms(&caps, 1), Self::parse_timestamp_to_ms(&caps, 5)));
                }
                Some(partial) => {
                    if !partial.text.is_empty() {
                        partial.text.push('\n');
                    }
                    partial.text.push_str(trimmed);
                }
            }
        }

        if let Some(partial) = current.take() {
            entries.push(Self::finish_entry(partial)?);
        }

        if entries.is_empty() {
            return Err(SubtitleError::Empty);
        }

        // Sort by start time to ensure correct order
        entries.sort_by_key(|entry| entry.start_time_ms);

        // Renumber entries to ensure sequential order
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.seq_num = i + 1;
        }

        Ok(entries)
    }

    fn finish_entry(partial: PartialEntry) -> std::result::Result<SubtitleEntry, SubtitleError> {
        let (start_ms, end_ms) = partial.times.ok_or_else(|| SubtitleError::Malformed {
            block: partial.block,
            message: "missing timestamp line".to_string(),
        })?;

        if end_ms < start_ms {
            warn!("Subtitle entry {} ends before it starts", partial.seq_num);
        }

        Ok(SubtitleEntry::new(partial.seq_num, start_ms, end_ms, partial.text))
    }

    /// Parse timestamp to milliseconds
    fn parse_timestamp_to_ms(caps: &regex::Captures, start_idx: usize) -> u64 {
        let part = |offset: usize| -> u64 {
            caps.get(start_idx + offset)
                .map_or(0, |m| m.as_str().parse().unwrap_or(0))
        };

        (part(0) * 3600 + part(1) * 60 + part(2)) * 1000 + part(3)
    }
}

impl fmt::Display for SubtitleCollection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Subtitle Collection")?;
        writeln!(f, "Source: {:?}", self.source_file)?;
        writeln!(f, "Entries: {}", self.entries.len())?;
        Ok(())
    }
}
