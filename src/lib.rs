/*!
# Tabdeck

A per-account dashboard for tabular uploads, built in Rust.

## Overview

Users upload CSV, TSV and spreadsheet files. Each upload is decoded into rows,
stored as a batch under the file's entry in a document store, and later read
back, normalized and grouped per file so it can be searched and rendered as
cards or a detail view.

## Architecture

### Decoding Layer
- **decoder**: Picks the decoder from the file extension and turns bytes into rows
  (`csv` for delimited text, `calamine` for spreadsheets)

### Data Layer
- **value**: Dynamically typed field values and ordered rows
- **normalizer**: Flattens stored batches into records stamped with `createdAt`
- **store**: File groups, case-insensitive search and the committed search box
- **render**: Per-field display decisions for cards and the detail view

### Persistence Layer
- **docstore**: The document store interface and an in-memory implementation
- **jsondb**: Document store kept as JSON files in a database directory

### Application Layer
- **dashboard**: Upload, replace, delete and fetch actions plus view state
- **account**: Signed-in account identity and profile
- **config**: Command line and environment configuration
- **app**: HTTP API (enabled by the `web` feature)

## REST API Endpoints

- `GET /api/files`, `POST /api/files` - List or upload files
- `PUT /api/files/{name}`, `DELETE /api/files/{name}` - Replace or delete a file
- `GET /api/groups?q={query}` - Search records, rendered as cards
- `GET /api/groups/{name}/records/{index}` - One record in the detail view
- `GET /api/account`, `PUT /api/account` - Read the display name or change the username
*/

pub mod account;
#[cfg(feature = "web")]
pub mod app;
pub mod config;
pub mod dashboard;
pub mod decoder;
pub mod docstore;
pub mod error;
pub mod jsondb;
pub mod normalizer;
pub mod render;
pub mod store;
pub mod value;

pub use account::{AccountContext, AccountProfile};
pub use dashboard::{Dashboard, StatusMessage, UploadFile, UploadReceipt};
pub use decoder::{FileKind, decode, decode_path};
pub use docstore::{DocumentStore, MemoryStore};
pub use error::{ActionError, DecodeError, StoreError};
pub use jsondb::JsonDirStore;
pub use normalizer::{BatchData, NormalizedRecord, UploadBatch, normalize};
pub use render::{RenderDecision, RenderedField, render_card, render_detail};
pub use store::{FileGroup, RecordStore, SearchInput};
pub use value::{FieldValue, Row, Timestamp};
