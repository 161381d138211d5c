//! NOR cell semantics shared by the simulated flash backends.
//!
//! Erase drives a range to `ERASED_BYTE`. Programming can only clear bits, so writing
//! `new` over `old` leaves `old & new` in the cell. `ProgramMode::Strict` refuses any
//! write where that result would differ from `new`; `ProgramMode::Nor` stores the AND
//! silently, as a real part does.

use anyhow::{bail, Result};

use crate::config::ProgramMode;

/// Value of an erased byte.
pub const ERASED_BYTE: u8 = 0xFF;

/// Validate that `offset..offset + len` lies within `capacity`.
pub fn check_range(capacity: usize, offset: usize, len: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => bail!(
            "range 0x{:X}+{} outside device capacity {}",
            offset,
            len,
            capacity
        ),
    }
}

/// Erase a range of cells.
pub fn erase(cells: &mut [u8], offset: usize, size: usize) -> Result<()> {
    check_range(cells.len(), offset, size)?;
    cells[offset..offset + size].fill(ERASED_BYTE);
    Ok(())
}

/// Program `data` at `offset` under the given mode.
pub fn program(cells: &mut [u8], offset: usize, data: &[u8], mode: ProgramMode) -> Result<()> {
    check_range(cells.len(), offset, data.len())?;
    let target = &mut cells[offset..offset + data.len()];

    if mode == ProgramMode::Strict {
        if let Some(pos) = target
            .iter()
            .zip(data)
            .position(|(old, new)| old & new != *new)
        {
            bail!(
                "programming non-erased cell at 0x{:X} (holds 0x{:02X}, wants 0x{:02X})",
                offset + pos,
                target[pos],
                data[pos]
            );
        }
    }

    for (cell, new) in target.iter_mut().zip(data) {
        *cell &= *new;
    }
    Ok(())
}
