//! Reader for the `.soxb` bytecode container: the on-disk encoding the
//! `soxc` binary accepts in place of the lexer/parser/bytecode compiler
//! that produces closures in a full Sox toolchain (out of scope here). One
//! file holds every closure of a module, in the same flat layout
//! `sox_frontend::bytecode::Closure` already models in memory.

use anyhow::{bail, Context, Result};
use sox_frontend::{Chunk, Closure, ConstantValue};
use std::path::Path;

const MAGIC: &[u8; 4] = b"SOXB";
const VERSION: u32 = 1;

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            bail!("truncated .soxb file at offset {}", self.pos);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        String::from_utf8(self.take(len)?.to_vec()).context("non-UTF-8 string in .soxb file")
    }

    fn bytes_field(&mut self) -> Result<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn u32_array(&mut self) -> Result<Vec<u32>> {
        let len = self.u32()? as usize;
        (0..len).map(|_| self.u32()).collect()
    }

    fn constant(&mut self) -> Result<ConstantValue> {
        Ok(match self.u8()? {
            0 => ConstantValue::Nil,
            1 => ConstantValue::Bool(self.u8()? != 0),
            2 => ConstantValue::Int(self.i64()?),
            3 => ConstantValue::Float(self.f64()?),
            4 => ConstantValue::Str(self.string()?),
            other => bail!("unknown constant tag {other} in .soxb file"),
        })
    }
}

/// Parse every closure in `path`'s `.soxb` container, in file order (entry
/// closure first, per `sox_frontend::build_module`'s convention).
pub fn read_closures(path: &Path) -> Result<Vec<Closure>> {
    let contents = std::fs::read(path)
        .with_context(|| format!("reading bytecode file {}", path.display()))?;
    let mut r = Reader::new(&contents);

    if r.take(4)? != MAGIC {
        bail!("{}: not a .soxb bytecode file", path.display());
    }
    let version = r.u32()?;
    if version != VERSION {
        bail!("{}: unsupported .soxb version {version}", path.display());
    }

    let closure_count = r.u32()?;
    let mut closures = Vec::with_capacity(closure_count as usize);
    for _ in 0..closure_count {
        let name = r.string()?;
        let arity = r.u32()?;
        let upvalue_count = r.u32()?;
        let local_count = r.u32()?;

        let constant_count = r.u32()?;
        let constants = (0..constant_count).map(|_| r.constant()).collect::<Result<Vec<_>>>()?;

        let code = r.bytes_field()?;
        let lines = r.u32_array()?;
        let chunk = Chunk { code, constants, lines };

        closures.push(Closure { name, arity, upvalue_count, local_count, chunk });
    }

    Ok(closures)
}
