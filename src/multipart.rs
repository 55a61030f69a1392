//! Multipart form bodies for file uploads.
//!
//! Both upload operations build their body through [`upload_form`], which
//! only needs an [`UploadSource`]: something with a file name and a byte
//! source. [`FileUpload`] reads a local file, [`FormFileUpload`] reads a file
//! part received by a web handler.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Form field carrying the end-user identifier.
pub const USER_FIELD: &str = "user";
/// Form field carrying the uploaded file.
pub const FILE_FIELD: &str = "file";

/// An in-memory `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct MultipartForm {
    boundary: String,
    body: BytesMut,
}

impl MultipartForm {
    /// Empty form with a random boundary.
    pub fn new() -> Self {
        Self::with_boundary(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            body: BytesMut::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the `Content-Type` header of this body.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Append a plain text field.
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.open_part(&format!("form-data; name=\"{}\"", escape_quotes(name)), None);
        self.body.put_slice(value.as_bytes());
        self
    }

    /// Append a file part. The part content type is guessed from `filename`.
    pub fn file(mut self, name: &str, filename: &str, data: &[u8]) -> Self {
        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        self.open_part(
            &format!(
                "form-data; name=\"{}\"; filename=\"{}\"",
                escape_quotes(name),
                escape_quotes(filename)
            ),
            Some(mime.essence_str()),
        );
        self.body.put_slice(data);
        self
    }

    /// Close the form and return the encoded body.
    pub fn finish(mut self) -> Bytes {
        self.body.put_slice(format!("\r\n--{}--\r\n", self.boundary).as_bytes());
        self.body.freeze()
    }

    fn open_part(&mut self, disposition: &str, content_type: Option<&str>) {
        if !self.body.is_empty() {
            self.body.put_slice(b"\r\n");
        }
        self.body.put_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.body
            .put_slice(format!("Content-Disposition: {disposition}\r\n").as_bytes());
        if let Some(content_type) = content_type {
            self.body
                .put_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        self.body.put_slice(b"\r\n");
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A named byte source that can be uploaded.
#[async_trait]
pub trait UploadSource: Send {
    /// File name sent in the `file` part.
    fn file_name(&self) -> String;

    /// Read the whole content.
    async fn read_all(&mut self) -> std::io::Result<Vec<u8>>;
}

/// A file on the local filesystem.
#[derive(Debug)]
pub struct FileUpload {
    file: tokio::fs::File,
    name: String,
}

impl FileUpload {
    /// Open `path`; the uploaded name is the path's base name.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(file, path))
    }

    /// Wrap an already opened file handle.
    pub fn new(file: tokio::fs::File, path: impl AsRef<Path>) -> Self {
        Self {
            file,
            name: base_name(path.as_ref()),
        }
    }

    /// Upload under a name other than the file's base name.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl UploadSource for FileUpload {
    fn file_name(&self) -> String {
        self.name.clone()
    }

    async fn read_all(&mut self) -> std::io::Result<Vec<u8>> {
        let mut data = Vec::new();
        self.file.read_to_end(&mut data).await?;
        Ok(data)
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).to_string_lossy().into_owned())
}

/// A file part of an inbound web form, as exposed by a web framework.
#[async_trait]
pub trait FormPart: Send + Sync {
    /// File name the browser sent for the part.
    fn filename(&self) -> &str;

    /// Open a reader over the part's content.
    async fn open(&self) -> std::io::Result<Box<dyn AsyncRead + Send + Unpin>>;
}

/// Uploads a [`FormPart`]. The reader opened for the part is closed as soon
/// as it has been read, whether reading succeeded or not.
pub struct FormFileUpload<P> {
    part: P,
}

impl<P: FormPart> FormFileUpload<P> {
    pub fn new(part: P) -> Self {
        Self { part }
    }

    pub fn into_inner(self) -> P {
        self.part
    }
}

#[async_trait]
impl<P: FormPart> UploadSource for FormFileUpload<P> {
    fn file_name(&self) -> String {
        self.part.filename().to_string()
    }

    async fn read_all(&mut self) -> std::io::Result<Vec<u8>> {
        let mut reader = self.part.open().await?;
        let mut data = Vec::new();
        let result = reader.read_to_end(&mut data).await;
        drop(reader);
        result.map(|_| data)
    }
}

#[async_trait]
impl FormPart for Box<dyn FormPart> {
    fn filename(&self) -> &str {
        (**self).filename()
    }

    async fn open(&self) -> std::io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        (**self).open().await
    }
}

/// A form part held in memory, e.g. one already extracted from a request.
#[derive(Debug, Clone)]
pub struct MemoryFormPart {
    filename: String,
    data: Bytes,
}

impl MemoryFormPart {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl FormPart for MemoryFormPart {
    fn filename(&self) -> &str {
        &self.filename
    }

    async fn open(&self) -> std::io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        Ok(Box::new(std::io::Cursor::new(self.data.clone())))
    }
}

/// Build the upload body: a `user` field followed by the `file` part.
pub async fn upload_form(
    form: MultipartForm,
    user: &str,
    source: &mut (dyn UploadSource + '_),
) -> std::io::Result<MultipartForm> {
    let data = source.read_all().await?;
    Ok(form
        .text(USER_FIELD, user)
        .file(FILE_FIELD, &source.file_name(), &data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    #[test]
    fn test_form_layout() {
        let body = MultipartForm::with_boundary("XYZ")
            .text("user", "u1")
            .file("file", "notes.txt", b"hello")
            .finish();

        let expected = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"user\"\r\n\r\n\
            u1\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            hello\r\n\
            --XYZ--\r\n";
        assert_eq!(String::from_utf8(body.to_vec()).unwrap(), expected);
    }

    #[test]
    fn test_unknown_extension_is_octet_stream() {
        let body = MultipartForm::with_boundary("b")
            .file("file", "blob.zzzunknown", b"\x00\x01")
            .finish();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("Content-Type: application/octet-stream\r\n"));
    }

    #[test]
    fn test_filename_quotes_are_escaped() {
        let body = MultipartForm::with_boundary("b")
            .file("file", "a\"b.txt", b"x")
            .finish();
        assert!(String::from_utf8_lossy(&body).contains("filename=\"a\\\"b.txt\""));
    }

    #[test]
    fn test_random_boundaries_differ() {
        let a = MultipartForm::new();
        let b = MultipartForm::new();
        assert_ne!(a.boundary(), b.boundary());
        assert!(a.content_type().ends_with(a.boundary()));
    }

    #[tokio::test]
    async fn test_file_and_form_part_produce_identical_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        tokio::fs::write(&path, b"# Report\nall good\n").await.unwrap();

        let mut file = FileUpload::open(&path).await.unwrap();
        let from_file = upload_form(MultipartForm::with_boundary("fixed"), "u1", &mut file)
            .await
            .unwrap()
            .finish();

        let mut part = FormFileUpload::new(MemoryFormPart::new("report.md", &b"# Report\nall good\n"[..]));
        let from_part = upload_form(MultipartForm::with_boundary("fixed"), "u1", &mut part)
            .await
            .unwrap()
            .finish();

        assert_eq!(from_file, from_part);
    }

    #[tokio::test]
    async fn test_file_upload_name_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tmp-123.bin");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let upload = FileUpload::open(&path).await.unwrap();
        assert_eq!(upload.file_name(), "tmp-123.bin");
        assert_eq!(upload.with_file_name("photo.png").file_name(), "photo.png");
    }

    struct TrackedReader {
        fail: bool,
        closed: Arc<AtomicBool>,
    }

    impl AsyncRead for TrackedReader {
        fn poll_read(self: Pin<&mut Self>, _: &mut Context<'_>, _: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
            if self.fail {
                Poll::Ready(Err(std::io::Error::other("disk gone")))
            } else {
                Poll::Ready(Ok(()))
            }
        }
    }

    impl Drop for TrackedReader {
        fn drop(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct TrackedPart {
        fail: bool,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl FormPart for TrackedPart {
        fn filename(&self) -> &str {
            "tracked.txt"
        }

        async fn open(&self) -> std::io::Result<Box<dyn AsyncRead + Send + Unpin>> {
            Ok(Box::new(TrackedReader {
                fail: self.fail,
                closed: self.closed.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn test_form_part_reader_closed_on_success_and_failure() {
        for fail in [false, true] {
            let closed = Arc::new(AtomicBool::new(false));
            let mut upload = FormFileUpload::new(TrackedPart {
                fail,
                closed: closed.clone(),
            });

            let result = upload.read_all().await;
            assert_eq!(result.is_err(), fail);
            assert!(closed.load(Ordering::SeqCst), "reader left open (fail = {fail})");
        }
    }
}
