//! EDF header parsing and encoding.
//!
//! On-disk layout of the fixed header (ASCII, space-padded, 256 bytes):
//! ```text
//!  8  version            "0"
//! 80  patient id
//! 80  recording id
//!  8  start date         dd.mm.yy
//!  8  start time         hh.mm.ss
//!  8  header size        256 × (1 + n_signals)
//! 44  reserved           "EDF+C" / "EDF+D" for EDF+, blank otherwise
//!  8  number of records
//!  8  record duration    seconds
//!  4  number of signals
//! ```
//! followed by one 256-byte block per signal, stored field-major (all labels,
//! then all transducers, …):
//! ```text
//! 16  label    80 transducer   8 dimension   8 phys min   8 phys max
//!  8  dig min   8 dig max     80 prefilter   8 samples/record  32 reserved
//! ```
use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Size of the fixed header and of each per-signal header block.
pub const HEADER_BLOCK: usize = 256;

/// Label of the EDF+ annotations signal.
pub const ANNOTATION_LABEL: &str = "EDF Annotations";

// ── Per-signal header ─────────────────────────────────────────────────────

/// Header fields of one signal.
#[derive(Debug, Clone)]
pub struct SignalHeader {
    pub label: String,
    pub transducer: String,
    /// Physical dimension, e.g. `"uV"`. Empty on non-compliant files.
    pub dimension: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: i32,
    pub digital_max: i32,
    pub prefilter: String,
    pub samples_per_record: usize,
}

impl SignalHeader {
    /// Physical units per digital step.
    #[inline]
    pub fn bit_value(&self) -> f64 {
        (self.physical_max - self.physical_min) / (self.digital_max - self.digital_min) as f64
    }

    /// Digital offset such that `physical = bit_value × (digital + offset)`.
    #[inline]
    pub fn offset(&self) -> f64 {
        self.physical_max / self.bit_value() - self.digital_max as f64
    }

    /// Convert a stored digital sample to physical units.
    #[inline]
    pub fn to_physical(&self, digital: i16) -> f64 {
        self.bit_value() * (digital as f64 + self.offset())
    }

    /// Convert a physical value to the nearest digital sample, clamped to the
    /// digital range.
    #[inline]
    pub fn to_digital(&self, physical: f64) -> i16 {
        let d = (physical / self.bit_value() - self.offset()).round();
        d.clamp(self.digital_min as f64, self.digital_max as f64) as i16
    }

    /// True for the EDF+ annotations signal.
    pub fn is_annotation(&self) -> bool {
        self.label == ANNOTATION_LABEL
    }
}

// ── File header ───────────────────────────────────────────────────────────

/// Parsed EDF file header (fixed block + all signal blocks).
#[derive(Debug, Clone)]
pub struct EdfHeader {
    pub patient: String,
    pub recording: String,
    pub start: NaiveDateTime,
    /// Reserved field of the fixed header; `"EDF+C"`/`"EDF+D"` marker.
    pub reserved: String,
    pub n_records: i64,
    /// Duration of one data record in seconds.
    pub record_duration: f64,
    pub signals: Vec<SignalHeader>,
}

impl EdfHeader {
    /// Total header size in bytes.
    pub fn header_bytes(&self) -> usize {
        HEADER_BLOCK * (1 + self.signals.len())
    }

    /// Size of one data record in bytes (2 bytes per sample).
    pub fn record_bytes(&self) -> usize {
        self.signals.iter().map(|s| s.samples_per_record * 2).sum()
    }

    /// Byte offset of signal `idx` inside a data record.
    pub fn signal_offset(&self, idx: usize) -> usize {
        self.signals[..idx].iter().map(|s| s.samples_per_record * 2).sum()
    }

    /// Sample rate of signal `idx` in Hz.
    pub fn sfreq(&self, idx: usize) -> f64 {
        self.signals[idx].samples_per_record as f64 / self.record_duration
    }

    /// Index of the EDF+ annotations signal, if present.
    pub fn annotation_signal(&self) -> Option<usize> {
        self.signals.iter().position(SignalHeader::is_annotation)
    }

    /// True when every data signal declares a physical dimension and a
    /// non-degenerate physical range. Files failing this are readable but not
    /// directly consumable downstream.
    pub fn has_physical_metadata(&self) -> bool {
        self.signals
            .iter()
            .filter(|s| !s.is_annotation())
            .all(|s| !s.dimension.is_empty() && s.physical_min < s.physical_max)
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────

fn ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

fn ascii_f64(bytes: &[u8], what: &str) -> Result<f64> {
    let s = ascii(bytes);
    s.parse::<f64>()
        .with_context(|| format!("non-numeric {what} field: {s:?}"))
}

fn ascii_i64(bytes: &[u8], what: &str) -> Result<i64> {
    let s = ascii(bytes);
    s.parse::<i64>()
        .with_context(|| format!("non-numeric {what} field: {s:?}"))
}

/// Parse `dd.mm.yy` + `hh.mm.ss` into a start instant.
///
/// Two-digit years pivot at 85 per the EDF+ clipping date (85–99 → 19xx).
pub fn parse_start(date: &str, time: &str) -> Result<NaiveDateTime> {
    let d: Vec<&str> = date.split('.').collect();
    let t: Vec<&str> = time.split('.').collect();
    if d.len() != 3 || t.len() != 3 {
        bail!("malformed start date/time: {date:?} {time:?}");
    }
    let yy: i32 = d[2].trim().parse().context("start year")?;
    let year = if yy > 84 { 1900 + yy } else { 2000 + yy };
    let date = NaiveDate::from_ymd_opt(
        year,
        d[1].trim().parse().context("start month")?,
        d[0].trim().parse().context("start day")?,
    )
    .with_context(|| format!("invalid start date {date:?}"))?;
    let time = NaiveTime::from_hms_opt(
        t[0].trim().parse().context("start hour")?,
        t[1].trim().parse().context("start minute")?,
        t[2].trim().parse().context("start second")?,
    )
    .with_context(|| format!("invalid start time {time:?}"))?;
    Ok(date.and_time(time))
}

/// Parse the fixed 256-byte block. Returns the header with an empty signal
/// table plus the signal count, which the caller uses to read the rest.
pub fn parse_fixed(block: &[u8]) -> Result<(EdfHeader, usize)> {
    if block.len() < HEADER_BLOCK {
        bail!("file shorter than the {HEADER_BLOCK}-byte EDF header");
    }
    let version = ascii(&block[0..8]);
    if version != "0" {
        bail!("unsupported EDF version field {version:?}");
    }
    let start = parse_start(&ascii(&block[168..176]), &ascii(&block[176..184]))?;
    let n_signals = ascii_i64(&block[252..256], "signal count")? as usize;
    if n_signals == 0 {
        bail!("EDF header declares zero signals");
    }
    let header = EdfHeader {
        patient: ascii(&block[8..88]),
        recording: ascii(&block[88..168]),
        start,
        reserved: ascii(&block[192..236]),
        n_records: ascii_i64(&block[236..244], "record count")?,
        record_duration: ascii_f64(&block[244..252], "record duration")?,
        signals: Vec::new(),
    };
    Ok((header, n_signals))
}

/// Parse the field-major signal header area (`n × 256` bytes).
pub fn parse_signals(area: &[u8], n: usize) -> Result<Vec<SignalHeader>> {
    if area.len() < n * HEADER_BLOCK {
        bail!("signal header area truncated: {} bytes for {n} signals", area.len());
    }
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let f = |base: usize, w: usize| &area[n * base + i * w..n * base + (i + 1) * w];
        let label = ascii(f(0, 16));
        let spr = ascii_i64(f(216, 8), "samples per record")?;
        if spr <= 0 {
            bail!("signal {label:?} declares {spr} samples per record");
        }
        out.push(SignalHeader {
            label,
            transducer: ascii(f(16, 80)),
            dimension: ascii(f(96, 8)),
            physical_min: ascii_f64(f(104, 8), "physical min")?,
            physical_max: ascii_f64(f(112, 8), "physical max")?,
            digital_min: ascii_i64(f(120, 8), "digital min")? as i32,
            digital_max: ascii_i64(f(128, 8), "digital max")? as i32,
            prefilter: ascii(f(136, 80)),
            samples_per_record: spr as usize,
        });
    }
    Ok(out)
}

// ── Encoding ──────────────────────────────────────────────────────────────

/// Left-justified, space-padded, truncated ASCII field.
fn field(s: &str, width: usize) -> Vec<u8> {
    let mut bytes: Vec<u8> = s
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .take(width)
        .collect();
    bytes.resize(width, b' ');
    bytes
}

/// Numeric field: greatest precision that fits in `width` characters.
fn num_field(v: f64, width: usize) -> Vec<u8> {
    for prec in (0..=6).rev() {
        let s = format!("{v:.prec$}");
        if s.len() <= width {
            return field(&s, width);
        }
    }
    // Falls back to integer formatting; values this large do not occur in
    // physical ranges we emit.
    field(&format!("{}", v as i64), width)
}

impl EdfHeader {
    /// Encode the complete header (fixed block + signal blocks).
    pub fn encode(&self) -> Vec<u8> {
        let n = self.signals.len();
        let mut out = Vec::with_capacity(self.header_bytes());

        out.extend(field("0", 8));
        out.extend(field(&self.patient, 80));
        out.extend(field(&self.recording, 80));
        out.extend(field(&self.start.format("%d.%m.%y").to_string(), 8));
        out.extend(field(&self.start.format("%H.%M.%S").to_string(), 8));
        out.extend(field(&format!("{}", self.header_bytes()), 8));
        out.extend(field(&self.reserved, 44));
        out.extend(field(&format!("{}", self.n_records), 8));
        out.extend(num_field(self.record_duration, 8));
        out.extend(field(&format!("{n}"), 4));

        for s in &self.signals {
            out.extend(field(&s.label, 16));
        }
        for s in &self.signals {
            out.extend(field(&s.transducer, 80));
        }
        for s in &self.signals {
            out.extend(field(&s.dimension, 8));
        }
        for s in &self.signals {
            out.extend(num_field(s.physical_min, 8));
        }
        for s in &self.signals {
            out.extend(num_field(s.physical_max, 8));
        }
        for s in &self.signals {
            out.extend(field(&format!("{}", s.digital_min), 8));
        }
        for s in &self.signals {
            out.extend(field(&format!("{}", s.digital_max), 8));
        }
        for s in &self.signals {
            out.extend(field(&s.prefilter, 80));
        }
        for s in &self.signals {
            out.extend(field(&format!("{}", s.samples_per_record), 8));
        }
        for _ in &self.signals {
            out.extend(field("", 32));
        }
        debug_assert_eq!(out.len(), self.header_bytes());
        out
    }
}
