/*!
Declarative structure descriptors in, command-line parsers out.

`parley` compiles structure definitions — field names, declared shapes,
defaults, and metadata — into a flat, conflict-free set of command-line
options, and performs the inverse: rebuilding typed, nested, possibly
variant-selected configuration values from the parsed results.

The pipeline, leaf first:

- [`descriptor`] extracts and validates the field table for each registered
  structure;
- [`naming`] assigns every field a unique external option name under a
  configurable conflict-resolution policy;
- [`convert`] turns raw tokens into typed values, shape by shape;
- [`emit`] flattens the registrations into the option surface, staging
  variant selectors ahead of the fields they unlock;
- [`reconstruct`] rebuilds the nested instances bottom-up, layering
  defaults beneath overlay files beneath the command line.

A short tour:

```no_run
use parley::{FieldDescriptor, Session, Shape, StructureDescriptor, Value};

let config = StructureDescriptor::builder("Config")
    .field(FieldDescriptor::new("a", Shape::Int).help("how many"))
    .field(FieldDescriptor::new("b", Shape::Int).default_value(Value::Int(10)))
    .build();

let mut session = Session::new("demo");
session.register_descriptor(config, "config", None).unwrap();

let tokens: Vec<String> = std::env::args().skip(1).collect();
let parsed = session.parse_or_exit(&tokens);
let instance = parsed.instance("config").unwrap();
assert_eq!(instance.get("b"), Some(&Value::Int(10)));
```

The actual splitting of `--option value` tokens lives in the
[`parley-parser`][parley_parser] crate; this crate is everything above it.
*/

pub mod convert;
pub mod descriptor;
pub mod emit;
pub mod error;
mod help;
pub mod naming;
pub mod overlay;
mod reconstruct;
pub mod session;
mod util;
pub mod value;

pub use convert::{ConverterRegistry, RawInput};
pub use descriptor::{
    Arity, CustomShape, Describe, EnumShape, FieldDefault, FieldDescriptor, Shape,
    StructureBuilder, StructureDescriptor, UnionShape, extract,
};
pub use emit::{CompiledSpec, ResolvedArgument};
pub use error::{Error, ErrorKind, TokenSyntaxError};
pub use naming::ConflictPolicy;
pub use overlay::OverlayMap;
pub use session::{HelpProvider, Parsed, Session};
pub use value::{FromStructure, StructValue, Value};
