/*!
A PDF generator with an imperative drawing API.

capypdf writes PDF files the way they are described in the PDF reference: pages are
content streams full of operators, and everything else, like fonts, images, colorspaces,
shadings or annotations, is an object that the content refers to. It builds on top of
the [pdf-writer] crate and adds the bookkeeping that a correct file needs: resource
dictionaries, balanced graphics states, font subsetting, a structure tree for tagged
output and output intents for prepress.

Start with the [`document`] module. A [`Document`] hands out draw contexts, which record
operators and are added back to the document when they are done. All objects are
registered with the document and referred to by small, copyable handles.

# Example

```no_run
use capypdf::color::Color;
use capypdf::configure::DocumentProperties;
use capypdf::document::Document;
use capypdf::text::Text;

# fn main() -> capypdf::error::CapyResult<()> {
let mut document = Document::new("hello.pdf", DocumentProperties::default())?;
let font = document.load_font("NotoSans-Regular.ttf")?;

let mut page = document.new_page_context();
page.set_fill_color(&Color::Cmyk(0.0, 0.6, 1.0, 0.0))?;
page.rect(50.0, 700.0, 200.0, 80.0)?;
page.fill();

let mut text = Text::new();
text.set_font(font, 24.0)?;
text.next_line(60.0, 650.0)?;
text.render_text("Hello from capypdf")?;
page.render_text_obj(&text)?;

document.add_page(page)?;
document.write()?;
# Ok(())
# }
```

[pdf-writer]: https://github.com/typst/pdf-writer
*/

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod chunk_container;
mod embed;
mod font;
mod metadata;
mod resource;
mod serialize;
mod stream;
mod util;
mod xobject;

pub mod annotation;
pub mod color;
pub mod configure;
pub mod destination;
pub mod document;
pub mod draw;
pub mod error;
pub mod function;
pub mod geom;
pub mod graphics_state;
pub mod handle;
pub mod image;
pub mod outline;
pub mod page;
pub mod pattern;
pub mod shading;
pub mod structure;
pub mod text;

pub use document::Document;
pub use draw::DrawContext;
pub use error::{CapyError, CapyResult};
pub use metadata::DateTime;
