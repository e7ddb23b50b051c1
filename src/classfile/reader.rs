use super::ClassLoadErr;

/// Big-endian cursor over class file bytes.
pub trait ClassReader {
    fn read_ubyte1(&mut self) -> Result<u8, ClassLoadErr> {
        let bytes = self.peek_nbytes(1)?;
        let result = bytes[0];
        self.skip(1);
        Ok(result)
    }

    fn read_ubyte2(&mut self) -> Result<u16, ClassLoadErr> {
        let bytes = self.peek_nbytes(2)?;
        let result = u16::from_be_bytes([bytes[0], bytes[1]]);
        self.skip(2);
        Ok(result)
    }

    fn read_ubyte4(&mut self) -> Result<u32, ClassLoadErr> {
        let bytes = self.peek_nbytes(4)?;
        let result = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        self.skip(4);
        Ok(result)
    }

    fn read_nbytes(&mut self, n: usize) -> Result<Vec<u8>, ClassLoadErr> {
        let bytes = self.peek_nbytes(n)?.to_vec();
        self.skip(n);
        Ok(bytes)
    }

    fn peek_nbytes(&self, n: usize) -> Result<&[u8], ClassLoadErr> {
        let start = self.offset();
        if start + n > self.class_bytes().len() {
            return Err(ClassLoadErr::InvalidFormat(format!(
                "out of range, expected {} bytes at offset {}",
                n, start
            )));
        }
        Ok(&self.class_bytes()[start..start + n])
    }

    fn offset(&self) -> usize;

    fn skip(&mut self, size: usize);

    fn class_bytes(&self) -> &[u8];

    fn available_bytes(&self) -> &[u8] {
        let offset = self.offset().min(self.class_bytes().len());
        &self.class_bytes()[offset..]
    }
}

pub struct OwnedBytesClassReader {
    class_bytes: Vec<u8>,
    offset: usize,
}

impl OwnedBytesClassReader {
    pub fn new(class_bytes: Vec<u8>) -> Self {
        OwnedBytesClassReader {
            class_bytes,
            offset: 0,
        }
    }
}

impl ClassReader for OwnedBytesClassReader {
    fn offset(&self) -> usize {
        self.offset
    }

    fn skip(&mut self, size: usize) {
        self.offset += size;
    }

    fn class_bytes(&self) -> &[u8] {
        self.class_bytes.as_slice()
    }
}

pub struct ExternalBytesClassReader<'a> {
    class_bytes: &'a [u8],
    offset: usize,
}

impl<'a> ExternalBytesClassReader<'a> {
    pub fn new(class_bytes: &'a [u8]) -> Self {
        ExternalBytesClassReader {
            class_bytes,
            offset: 0,
        }
    }
}

impl<'a> ClassReader for ExternalBytesClassReader<'a> {
    fn offset(&self) -> usize {
        self.offset
    }

    fn skip(&mut self, size: usize) {
        self.offset += size;
    }

    fn class_bytes(&self) -> &[u8] {
        self.class_bytes
    }
}
