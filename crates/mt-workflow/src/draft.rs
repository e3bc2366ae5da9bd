use mt_api_types::{ImageSource, ImageUrl, UploadedFile};

/// User input for one NFT. At most one image source is held at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NftDraft {
    pub name: String,
    pub description: String,
    image: Option<ImageSource>,
}

impl NftDraft {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            image: None,
        }
    }

    pub fn image(&self) -> Option<&ImageSource> {
        self.image.as_ref()
    }

    pub fn generated_url(&self) -> Option<&ImageUrl> {
        match &self.image {
            Some(ImageSource::Generated(url)) => Some(url),
            _ => None,
        }
    }

    pub fn uploaded_file(&self) -> Option<&UploadedFile> {
        match &self.image {
            Some(ImageSource::Uploaded(file)) => Some(file),
            _ => None,
        }
    }

    /// Replaces any uploaded file.
    pub fn set_generated(&mut self, url: ImageUrl) {
        self.image = Some(ImageSource::Generated(url));
    }

    /// Replaces any generated image.
    pub fn set_uploaded(&mut self, file: UploadedFile) {
        self.image = Some(ImageSource::Uploaded(file));
    }

    pub fn clear_image(&mut self) -> Option<ImageSource> {
        self.image.take()
    }

    /// Name and description trimmed, or the message to show when either is blank.
    pub fn details(&self) -> Result<(&str, &str), String> {
        let name = self.name.trim();
        let description = self.description.trim();
        if name.is_empty() || description.is_empty() {
            return Err("Please provide a name and description".to_owned());
        }
        Ok((name, description))
    }
}
