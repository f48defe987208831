use std::{
    fs::File,
    io::{
        self,
        BufReader,
        BufWriter,
        Read,
        Write,
    },
    path::Path,
};

/// Compression of a result file, chosen by its suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Bzip2,
    None,
}

impl Compression {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("gz") => Compression::Gzip,
            Some("bz2") | Some("nbz") => Compression::Bzip2,
            _ => Compression::None,
        }
    }

    pub fn read_to_string(self, path: &Path) -> io::Result<String> {
        let mut file = BufReader::new(File::open(path)?);
        let mut content = String::new();
        match self {
            Compression::Gzip => flate2::read::MultiGzDecoder::new(file).read_to_string(&mut content)?,
            Compression::Bzip2 => bzip2::read::MultiBzDecoder::new(file).read_to_string(&mut content)?,
            Compression::None => file.read_to_string(&mut content)?,
        };
        Ok(content)
    }

    pub fn write(self, path: &Path, content: &[u8]) -> io::Result<()> {
        let file = BufWriter::new(File::create(path)?);
        let mut file = match self {
            Compression::Gzip => {
                let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
                encoder.write_all(content)?;
                encoder.finish()?
            }
            Compression::Bzip2 => {
                let mut encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
                encoder.write_all(content)?;
                encoder.finish()?
            }
            Compression::None => {
                let mut file = file;
                file.write_all(content)?;
                file
            }
        };
        file.flush()
    }
}
