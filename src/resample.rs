//! FFT-based rational resampler for reconciling a channel's rate with the
//! analyzer reference rate.
//!
//! Algorithm:
//!   1. Pad with reflect-limited samples on each side (auto length, next
//!      power of two).
//!   2. rfft(padded) → complex half-spectrum.
//!   3. If downsampling: double the Nyquist bin; if upsampling: halve it.
//!   4. Scale all bins by `new_len_padded / old_len_padded`.
//!   5. irfft at the new padded length (spectrum truncation / zero-padding).
//!   6. Strip the resampled padding edges.
//!
//! The output length is `round(n · dst / src)` — the full span is kept;
//! rate reconciliation never truncates the recording.
use anyhow::Result;
use rustfft::{num_complex::Complex, FftPlanner};

/// Padding lengths `(left, right)`: pad the signal out to the next power of
/// two after adding `min(n/8, 100) × 2` samples.
pub fn auto_npad(n: usize) -> (usize, usize) {
    let min_add = (n / 8).min(100) * 2;
    let sum = n + min_add;
    let next_pow2 = 1usize << ((sum as f64).log2().ceil() as u32);
    let total = next_pow2 - n;
    (total / 2, total - total / 2)
}

/// Resample `x` from `src_sfreq` to `dst_sfreq`. Returns the input unchanged
/// when the rates already agree.
pub fn resample(x: &[f64], src_sfreq: f64, dst_sfreq: f64) -> Result<Vec<f64>> {
    if (src_sfreq - dst_sfreq).abs() < 1e-6 {
        return Ok(x.to_vec());
    }
    let (npad_l, npad_r) = auto_npad(x.len());
    resample_1d(x, dst_sfreq / src_sfreq, npad_l, npad_r)
}

/// Resample a single 1-D signal with explicit (possibly asymmetric) padding.
pub fn resample_1d(x: &[f64], ratio: f64, npad_l: usize, npad_r: usize) -> Result<Vec<f64>> {
    let n_in = x.len();
    if n_in == 0 {
        return Ok(vec![]);
    }
    let final_len = (ratio * n_in as f64).round() as usize;

    // --- 1. Reflect-limited padding --------------------------------------
    let pad_l = npad_l.min(n_in - 1);
    let pad_r = npad_r.min(n_in - 1);
    let old_len = n_in + pad_l + pad_r;

    let mut x_ext = Vec::with_capacity(old_len);
    for i in (1..=pad_l).rev() {
        x_ext.push(2.0 * x[0] - x[i]);
    }
    x_ext.extend_from_slice(x);
    let last = x[n_in - 1];
    for i in 1..=pad_r {
        let idx = (n_in - 1).saturating_sub(i);
        x_ext.push(2.0 * last - x[idx]);
    }

    // --- 2. Padded output length -----------------------------------------
    let new_len_padded = (ratio * old_len as f64).round() as usize;
    let shorter = new_len_padded < old_len;
    let use_len = if shorter { new_len_padded } else { old_len };

    // --- 3. rfft of the padded signal ------------------------------------
    let mut planner: FftPlanner<f64> = FftPlanner::new();
    let fft = planner.plan_fft_forward(old_len);
    let mut buf: Vec<Complex<f64>> = x_ext
        .iter()
        .map(|&v| Complex { re: v, im: 0.0 })
        .collect();
    fft.process(&mut buf);

    let rfft_len = old_len / 2 + 1;
    let mut x_fft: Vec<Complex<f64>> = buf[..rfft_len].to_vec();

    // --- 4. Nyquist bin --------------------------------------------------
    if use_len % 2 == 0 {
        let nyq = use_len / 2;
        if nyq < x_fft.len() {
            let factor = if shorter { 2.0 } else { 0.5 };
            x_fft[nyq] *= factor;
        }
    }

    // --- 5. Amplitude scale ----------------------------------------------
    let scale = new_len_padded as f64 / old_len as f64;
    for v in &mut x_fft {
        *v *= scale;
    }

    // --- 6. irfft at the new length --------------------------------------
    let new_rfft_len = new_len_padded / 2 + 1;
    let mut irfft_in = vec![Complex::<f64>::default(); new_len_padded];
    let n_copy = x_fft.len().min(new_rfft_len);
    irfft_in[..n_copy].copy_from_slice(&x_fft[..n_copy]);

    // Hermitian mirror of the half-spectrum.
    for i in 1..new_rfft_len {
        let idx = new_len_padded - i;
        if idx < new_len_padded && idx >= new_rfft_len {
            irfft_in[idx] = irfft_in[i].conj();
        }
    }

    let ifft = planner.plan_fft_inverse(new_len_padded);
    ifft.process(&mut irfft_in);
    let inv_scale = 1.0 / new_len_padded as f64;

    // --- 7. Strip padding -------------------------------------------------
    let to_remove_l = (ratio * npad_l as f64).round() as usize;
    let to_remove_r = new_len_padded.saturating_sub(final_len + to_remove_l);
    let strip_end = new_len_padded.saturating_sub(to_remove_r);

    let mut result: Vec<f64> = irfft_in[to_remove_l..strip_end]
        .iter()
        .map(|c| c.re * inv_scale)
        .collect();
    result.resize(final_len, 0.0);
    Ok(result)
}

/// `(up, down)` from dst/src via GCD reduction (for length checks).
pub fn rational_approx(dst: f64, src: f64) -> (usize, usize) {
    let scale = 1000usize;
    let up0 = (dst * scale as f64).round() as usize;
    let down0 = (src * scale as f64).round() as usize;
    let g = gcd(up0, down0);
    (up0 / g, down0 / g)
}

/// Exact output length: `round(n · up / down)`.
pub fn final_length(n: usize, up: usize, down: usize) -> usize {
    (n as f64 * up as f64 / down as f64).round() as usize
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
