use std::io::{Read, Write};

/// Big-endian primitive reads, the byte order used by every slime structure.
pub trait ReadExt {
    fn read_const<const N: usize>(&mut self) -> std::io::Result<[u8; N]>;
    fn read_var(&mut self, size: usize) -> std::io::Result<Box<[u8]>>;
    fn read_all(&mut self) -> std::io::Result<Box<[u8]>>;

    fn read_u8(&mut self) -> std::io::Result<u8> {
        Ok(u8::from_be_bytes(self.read_const()?))
    }

    fn read_bool(&mut self) -> std::io::Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    fn read_i16(&mut self) -> std::io::Result<i16> {
        Ok(i16::from_be_bytes(self.read_const()?))
    }

    fn read_i32(&mut self) -> std::io::Result<i32> {
        Ok(i32::from_be_bytes(self.read_const()?))
    }

    fn read_i64(&mut self) -> std::io::Result<i64> {
        Ok(i64::from_be_bytes(self.read_const()?))
    }

    /// Reads a signed 32 bit length, rejecting negative values.
    fn read_len(&mut self) -> std::io::Result<usize> {
        let length = self.read_i32()?;
        usize::try_from(length).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Negative length {}", length),
            )
        })
    }

    /// Reads `size` bytes and discards them.
    fn skip(&mut self, size: usize) -> std::io::Result<()> {
        self.read_var(size).map(|_| ())
    }
}

impl<T: Read> ReadExt for T {
    fn read_const<const N: usize>(&mut self) -> std::io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_var(&mut self, size: usize) -> std::io::Result<Box<[u8]>> {
        let mut buf = vec![0u8; size].into_boxed_slice();
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_all(&mut self) -> std::io::Result<Box<[u8]>> {
        let mut data = Vec::new();
        self.read_to_end(&mut data)?;
        Ok(data.into_boxed_slice())
    }
}

pub trait WriteExt {
    fn write_bool(&mut self, value: bool) -> std::io::Result<()>;
    fn write_i16(&mut self, value: i16) -> std::io::Result<()>;
    fn write_u16(&mut self, value: u16) -> std::io::Result<()>;
    fn write_i32(&mut self, value: i32) -> std::io::Result<()>;
    fn write_i64(&mut self, value: i64) -> std::io::Result<()>;
}

impl<T: Write> WriteExt for T {
    fn write_bool(&mut self, value: bool) -> std::io::Result<()> {
        self.write_all(&[value as u8])
    }

    fn write_i16(&mut self, value: i16) -> std::io::Result<()> {
        self.write_all(&value.to_be_bytes())
    }

    fn write_u16(&mut self, value: u16) -> std::io::Result<()> {
        self.write_all(&value.to_be_bytes())
    }

    fn write_i32(&mut self, value: i32) -> std::io::Result<()> {
        self.write_all(&value.to_be_bytes())
    }

    fn write_i64(&mut self, value: i64) -> std::io::Result<()> {
        self.write_all(&value.to_be_bytes())
    }
}

#[cfg(test)]
mod test {
    use super::{ReadExt as _, WriteExt as _};

    #[test]
    fn big_endian_primitives() -> std::io::Result<()> {
        let mut data = Vec::new();
        data.write_i16(-2)?;
        data.write_i32(0x0102_0304)?;
        data.write_bool(true)?;
        assert_eq!(data, [0xFF, 0xFE, 1, 2, 3, 4, 1]);

        let mut reader = std::io::Cursor::new(data);
        assert_eq!(reader.read_i16()?, -2);
        assert_eq!(reader.read_i32()?, 0x0102_0304);
        assert!(reader.read_bool()?);
        assert!(reader.read_u8().is_err());
        Ok(())
    }

    #[test]
    fn negative_length_is_rejected() {
        let mut reader = std::io::Cursor::new((-1i32).to_be_bytes());
        assert_eq!(
            reader.read_len().unwrap_err().kind(),
            std::io::ErrorKind::InvalidData
        );
    }
}
