use std::path::{Path, PathBuf};

const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container xmlns="urn:oasis:names:tc:opendocument:xmlns:container" version="1.0">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

/// Builds small EPUB packages in memory.
pub struct EpubBuilder {
    chapters: Vec<(String, String, bool)>,
}

impl EpubBuilder {
    pub fn new() -> Self {
        Self {
            chapters: Vec::new(),
        }
    }

    /// Add a deflated chapter. `title` goes into the nav document.
    pub fn chapter(mut self, title: &str, body: &str) -> Self {
        self.chapters.push((title.to_string(), body.to_string(), true));
        self
    }

    /// Add a chapter stored without compression.
    pub fn stored_chapter(mut self, title: &str, body: &str) -> Self {
        self.chapters.push((title.to_string(), body.to_string(), false));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut manifest = String::from(
            r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>"#,
        );
        let mut spine = String::new();
        let mut nav = String::from(r#"<html><body><nav epub:type="toc"><ol>"#);
        let mut chapter_files = Vec::with_capacity(self.chapters.len());
        for (i, (title, body, deflate)) in self.chapters.iter().enumerate() {
            let href = format!("text/ch{}.xhtml", i + 1);
            manifest.push_str(&format!(
                r#"<item id="c{i}" href="{href}" media-type="application/xhtml+xml"/>"#
            ));
            spine.push_str(&format!(r#"<itemref idref="c{i}"/>"#));
            nav.push_str(&format!(r#"<li><a href="{href}">{title}</a></li>"#));
            let xhtml = format!(
                "<?xml version=\"1.0\"?><html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>{title}</title></head><body>{body}</body></html>"
            );
            chapter_files.push((format!("OEBPS/{href}"), xhtml.into_bytes(), *deflate));
        }
        nav.push_str("</ol></nav></body></html>");
        let opf = format!(
            r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <manifest>{manifest}</manifest>
  <spine>{spine}</spine>
</package>"#
        );

        let mut files: Vec<(String, Vec<u8>, bool)> = vec![
            ("mimetype".into(), b"application/epub+zip".to_vec(), false),
            ("META-INF/container.xml".into(), CONTAINER_XML.as_bytes().to_vec(), true),
            ("OEBPS/content.opf".into(), opf.into_bytes(), true),
            ("OEBPS/nav.xhtml".into(), nav.into_bytes(), true),
        ];
        files.extend(chapter_files);
        build_zip(&files)
    }

    /// Write the package to `dir/name` and return its path.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).expect("write epub");
        path
    }
}

/// `count` paragraphs of generated prose, each `words` words long.
pub fn prose(count: usize, words: usize) -> String {
    const VOCAB: &[&str] = &[
        "the", "reader", "turned", "another", "page", "while", "rain", "kept", "falling",
        "over", "quiet", "harbour", "streets", "and", "lanterns", "flickered", "beyond",
        "understanding", "of", "everyone", "who", "watched",
    ];
    let mut out = String::new();
    for p in 0..count {
        out.push_str("<p>");
        for w in 0..words {
            if w > 0 {
                out.push(' ');
            }
            out.push_str(VOCAB[(p * 7 + w * 3) % VOCAB.len()]);
        }
        out.push_str(".</p>");
    }
    out
}

fn build_zip(files: &[(String, Vec<u8>, bool)]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut central = Vec::new();
    for (name, data, deflate) in files {
        let payload = if *deflate {
            miniz_oxide::deflate::compress_to_vec(data, 6)
        } else {
            data.clone()
        };
        let method: u16 = if *deflate { 8 } else { 0 };
        let crc = crc32fast::hash(data);
        let offset = out.len() as u32;

        out.extend_from_slice(&0x04034b50u32.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&method.to_le_bytes());
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&payload);

        central.extend_from_slice(&0x02014b50u32.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&method.to_le_bytes());
        central.extend_from_slice(&[0u8; 4]);
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&[0u8; 12]);
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name.as_bytes());
    }
    let cd_offset = out.len() as u32;
    out.extend_from_slice(&central);
    out.extend_from_slice(&0x06054b50u32.to_le_bytes());
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&(files.len() as u16).to_le_bytes());
    out.extend_from_slice(&(files.len() as u16).to_le_bytes());
    out.extend_from_slice(&(central.len() as u32).to_le_bytes());
    out.extend_from_slice(&cd_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}
