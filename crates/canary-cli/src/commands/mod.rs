pub mod deploy;
pub mod invoke;
pub mod roll;
pub mod status;
pub mod teardown;

use std::io::Write;

use serde::Serialize;

/// Pretty JSON plus a trailing newline.
pub(crate) fn emit<T: Serialize>(out: &mut impl Write, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
