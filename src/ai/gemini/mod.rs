/// Adds a `with_base_url` builder to a capability client wrapping a
/// [`client::GeminiHttpClient`] in a field named `http`.
macro_rules! impl_with_gemini_base_url {
    ($client:ty) => {
        impl $client {
            /// Points the client at a different API host (proxies, test servers).
            pub fn with_base_url(mut self, base_url: String) -> Self {
                self.http = self.http.with_base_url(base_url);
                self
            }
        }
    };
}
pub(crate) use impl_with_gemini_base_url;

pub mod client;
pub mod edit;
pub mod ideas;
pub mod image;
pub mod speech;
pub mod types;
pub mod video;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::GeminiHttpClient;
pub use edit::GeminiEditClient;
pub use ideas::GeminiIdeaClient;
pub use image::GeminiImageClient;
pub use speech::GeminiSpeechClient;
pub use video::GeminiVideoClient;
