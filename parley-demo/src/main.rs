use std::sync::{Arc, OnceLock};

use anyhow::Result;
use parley::{
    Describe, EnumShape, ErrorKind, FieldDescriptor, FromStructure, Session, Shape, StructValue,
    StructureDescriptor, UnionShape, Value,
};

#[derive(Debug)]
struct DataConfig {
    path: String,
    batch_size: i64,
    shuffle: bool,
}

impl Describe for DataConfig {
    fn descriptor() -> Arc<StructureDescriptor> {
        static DESCRIPTOR: OnceLock<Arc<StructureDescriptor>> = OnceLock::new();
        DESCRIPTOR
            .get_or_init(|| {
                StructureDescriptor::builder("DataConfig")
                    .field(
                        FieldDescriptor::new("path", Shape::Str)
                            .help("directory holding the training examples"),
                    )
                    .field(
                        FieldDescriptor::new("batch_size", Shape::Int)
                            .default_value(Value::Int(32))
                            .alias("bs")
                            .help("examples per training step"),
                    )
                    .field(
                        FieldDescriptor::new("shuffle", Shape::Bool)
                            .default_value(Value::Bool(true)),
                    )
                    .build()
            })
            .clone()
    }
}

impl FromStructure for DataConfig {
    fn from_structure(value: &StructValue) -> Result<Self, parley::Error> {
        Ok(Self {
            path: value.field("path", Value::as_str)?.to_owned(),
            batch_size: value.field("batch_size", Value::as_int)?,
            shuffle: value.field("shuffle", Value::as_bool)?,
        })
    }
}

#[derive(Debug)]
struct Sgd {
    lr: f64,
    momentum: f64,
}

impl Describe for Sgd {
    fn descriptor() -> Arc<StructureDescriptor> {
        static DESCRIPTOR: OnceLock<Arc<StructureDescriptor>> = OnceLock::new();
        DESCRIPTOR
            .get_or_init(|| {
                StructureDescriptor::builder("Sgd")
                    .field(
                        FieldDescriptor::new("lr", Shape::Float)
                            .default_value(Value::Float(0.01))
                            .help("learning rate"),
                    )
                    .field(
                        FieldDescriptor::new("momentum", Shape::Float)
                            .default_value(Value::Float(0.9)),
                    )
                    .build()
            })
            .clone()
    }
}

impl FromStructure for Sgd {
    fn from_structure(value: &StructValue) -> Result<Self, parley::Error> {
        Ok(Self {
            lr: value.field("lr", Value::as_float)?,
            momentum: value.field("momentum", Value::as_float)?,
        })
    }
}

#[derive(Debug)]
struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
}

impl Describe for Adam {
    fn descriptor() -> Arc<StructureDescriptor> {
        static DESCRIPTOR: OnceLock<Arc<StructureDescriptor>> = OnceLock::new();
        DESCRIPTOR
            .get_or_init(|| {
                StructureDescriptor::builder("Adam")
                    .field(
                        FieldDescriptor::new("lr", Shape::Float)
                            .default_value(Value::Float(0.001))
                            .help("learning rate"),
                    )
                    .field(
                        FieldDescriptor::new("beta1", Shape::Float)
                            .default_value(Value::Float(0.9)),
                    )
                    .field(
                        FieldDescriptor::new("beta2", Shape::Float)
                            .default_value(Value::Float(0.999)),
                    )
                    .build()
            })
            .clone()
    }
}

impl FromStructure for Adam {
    fn from_structure(value: &StructValue) -> Result<Self, parley::Error> {
        Ok(Self {
            lr: value.field("lr", Value::as_float)?,
            beta1: value.field("beta1", Value::as_float)?,
            beta2: value.field("beta2", Value::as_float)?,
        })
    }
}

#[derive(Debug)]
enum Optimizer {
    Sgd(Sgd),
    Adam(Adam),
}

impl FromStructure for Optimizer {
    fn from_structure(value: &StructValue) -> Result<Self, parley::Error> {
        // the reconstructed variant carries its structure's name
        match value.name() {
            "Sgd" => Sgd::from_structure(value).map(Optimizer::Sgd),
            "Adam" => Adam::from_structure(value).map(Optimizer::Adam),
            other => Err(ErrorKind::Reconstruction {
                path: "optimizer".to_owned(),
                message: format!("unexpected optimizer variant '{other}'"),
            }
            .into()),
        }
    }
}

#[derive(Debug)]
struct TrainConfig {
    epochs: i64,
    precision: String,
    seed: Option<i64>,
    tags: Vec<String>,
    data: DataConfig,
    optimizer: Optimizer,
}

impl Describe for TrainConfig {
    fn descriptor() -> Arc<StructureDescriptor> {
        static DESCRIPTOR: OnceLock<Arc<StructureDescriptor>> = OnceLock::new();
        DESCRIPTOR
            .get_or_init(|| {
                StructureDescriptor::builder("TrainConfig")
                    .doc("Train a small classifier on a directory of examples.")
                    .field(
                        FieldDescriptor::new("epochs", Shape::Int)
                            .default_value(Value::Int(10))
                            .help("number of passes over the training set"),
                    )
                    .field(
                        FieldDescriptor::new(
                            "precision",
                            Shape::Enum(EnumShape::new("Precision", &["fp32", "fp16", "bf16"])),
                        )
                        .default_value(Value::Str("fp32".to_owned()))
                        .help("numeric precision for model weights"),
                    )
                    .field(
                        FieldDescriptor::new("seed", Shape::optional(Shape::Int))
                            .help("fix the RNG seed for reproducible runs"),
                    )
                    .field(
                        FieldDescriptor::new("tags", Shape::var_seq(Shape::Str))
                            .default_with(|| Value::List(Vec::new()))
                            .help("free-form labels recorded with the run"),
                    )
                    .field(FieldDescriptor::new(
                        "data",
                        Shape::Struct(DataConfig::descriptor()),
                    ))
                    .field(
                        FieldDescriptor::new(
                            "optimizer",
                            Shape::Union(
                                UnionShape::new([
                                    ("sgd", Sgd::descriptor()),
                                    ("adam", Adam::descriptor()),
                                ])
                                .with_default("sgd"),
                            ),
                        )
                        .help("which optimizer to train with"),
                    )
                    .build()
            })
            .clone()
    }
}

impl FromStructure for TrainConfig {
    fn from_structure(value: &StructValue) -> Result<Self, parley::Error> {
        Ok(Self {
            epochs: value.field("epochs", Value::as_int)?,
            precision: value.field("precision", Value::as_str)?.to_owned(),
            seed: match value.field("seed", |seed| Some(seed))? {
                Value::None => None,
                seed => Some(seed.as_int().ok_or_else(|| ErrorKind::Reconstruction {
                    path: "train.seed".to_owned(),
                    message: format!("unexpected {} value", seed.type_name()),
                })?),
            },
            tags: value
                .field("tags", Value::as_list)?
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            data: DataConfig::from_structure(value.field("data", Value::as_struct)?)?,
            optimizer: Optimizer::from_structure(value.field("optimizer", Value::as_struct)?)?,
        })
    }
}

fn main() -> Result<()> {
    let mut session = Session::new("parley-demo")
        .with_description("Train a small classifier on a directory of examples.");

    session.register::<TrainConfig>("train")?;

    let config: TrainConfig = session.parse_env_or_exit().get("train")?;
    println!("{config:#?}");

    Ok(())
}
