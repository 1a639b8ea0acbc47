use anyhow::Result;
use candle_core::{Device, Tensor};
use tokenizers::Encoding;

/// `<pad>` in the XLM-RoBERTa vocabulary.
pub const PAD_ID: u32 = 1;

/// Stacks encodings into `[B, T]` ids and attention mask, where `T` is the
/// longest encoding capped at `max_len`. Padding uses [`PAD_ID`] and mask 0.
pub fn pad_batch(encodings: &[Encoding], max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let rows: Vec<(&[u32], &[u32])> = encodings.iter().map(|e| (e.get_ids(), e.get_attention_mask())).collect();
    pad_rows(&rows, max_len, device)
}

/// [`pad_batch`] over raw `(ids, attention_mask)` rows.
pub fn pad_rows(rows: &[(&[u32], &[u32])], max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let width = rows.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0).clamp(1, max_len.max(1));
    let mut ids = Vec::with_capacity(rows.len() * width);
    let mut mask = Vec::with_capacity(rows.len() * width);
    for (row_ids, row_mask) in rows {
        let n = row_ids.len().min(row_mask.len()).min(width);
        ids.extend_from_slice(&row_ids[..n]);
        mask.extend_from_slice(&row_mask[..n]);
        ids.extend(std::iter::repeat(PAD_ID).take(width - n));
        mask.extend(std::iter::repeat(0).take(width - n));
    }
    let input_ids = Tensor::from_vec(ids, (rows.len(), width), device)?;
    let attention_mask = Tensor::from_vec(mask, (rows.len(), width), device)?;
    Ok((input_ids, attention_mask))
}
