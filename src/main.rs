//! Command-line interface for xsdbind

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::path::{Path, PathBuf};
#[cfg(feature = "cli")]
use std::sync::Arc;

#[cfg(feature = "cli")]
use xsdbind::config::{all_dependencies, Configuration, ParserProperty};
#[cfg(feature = "cli")]
use xsdbind::loaders::Loader;
#[cfg(feature = "cli")]
use xsdbind::locations::Location;
#[cfg(feature = "cli")]
use xsdbind::namespaces::QName;
#[cfg(feature = "cli")]
use xsdbind::schema::{Schema, SchemaBuilder};
#[cfg(feature = "cli")]
use xsdbind::value::{Class, Value};
#[cfg(feature = "cli")]
use xsdbind::{Decoder, Encoder, EncoderOptions};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "xsdbind")]
#[command(author, version, about = "Schema-driven XML encoding and decoding", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect an XSD schema: global components, content models, dependency order
    Inspect {
        /// Path to the XSD schema file
        #[arg(value_name = "SCHEMA")]
        schema: PathBuf,

        /// Show the particles and attributes of a global element
        #[arg(short, long)]
        element: Option<String>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Decode an XML document to JSON
    Decode {
        /// Path to the XSD schema file
        #[arg(short, long, value_name = "SCHEMA")]
        schema: PathBuf,

        /// Path to the XML file to decode
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Keep elements and attributes the schema does not declare
        #[arg(long)]
        lenient: bool,

        /// Pretty print the output
        #[arg(short, long)]
        pretty: bool,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Encode a JSON document as XML
    Encode {
        /// Path to the XSD schema file
        #[arg(short, long, value_name = "SCHEMA")]
        schema: PathBuf,

        /// Path to the JSON file to encode
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Root element, `{namespace}local` or a global element's local name
        #[arg(short, long)]
        element: String,

        /// Indent the output
        #[arg(short, long)]
        indent: bool,

        /// Leave out the XML declaration
        #[arg(long)]
        omit_declaration: bool,

        /// Options file (JSON) overriding the encoder defaults
        #[arg(long)]
        options: Option<PathBuf>,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[cfg(feature = "cli")]
fn main() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Inspect { schema, element, json } => cmd_inspect(schema, element, json),
        Commands::Decode {
            schema,
            file,
            lenient,
            pretty,
            output,
        } => cmd_decode(schema, file, lenient, pretty, output),
        Commands::Encode {
            schema,
            file,
            element,
            indent,
            omit_declaration,
            options,
            output,
        } => cmd_encode(schema, file, element, indent, omit_declaration, options, output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Configuration for a schema file, keyed by the schema's target namespace
#[cfg(feature = "cli")]
fn configuration(
    schema_path: &Path,
    properties: &[ParserProperty],
) -> Result<Arc<Configuration>, Box<dyn std::error::Error>> {
    let location = Location::path(schema_path);
    let schema = SchemaBuilder::new(Loader::new())
        .with_source(location.clone())
        .build()?;
    let namespace = schema.target_namespace().unwrap_or_default().to_string();

    let mut configuration = Configuration::new(namespace).with_schema(location);
    for property in properties {
        configuration = configuration.with_property(*property);
    }
    Ok(Arc::new(configuration))
}

#[cfg(feature = "cli")]
fn cmd_inspect(
    schema_path: PathBuf,
    element: Option<String>,
    json_output: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let configuration = configuration(&schema_path, &[])?;
    let schema = configuration.schema()?;

    if let Some(name) = element {
        let qname = find_element(&schema, &name)?;
        print_element_details(&schema, &qname, json_output)?;
        return Ok(());
    }

    let dependencies: Vec<String> = all_dependencies(&configuration)?
        .iter()
        .map(|c| c.namespace().to_string())
        .collect();

    if json_output {
        let elements: Vec<serde_json::Value> = schema
            .global_elements()
            .map(|(qname, id)| {
                let declaration = schema.element(id);
                serde_json::json!({
                    "name": qname.to_string(),
                    "type": schema.type_name(declaration.type_id).map(|t| t.to_string()),
                    "abstract": declaration.is_abstract,
                    "nillable": declaration.nillable,
                })
            })
            .collect();
        let types: Vec<serde_json::Value> = schema
            .global_types()
            .filter(|(qname, _)| qname.namespace.as_deref() != Some(xsdbind::XSD_NAMESPACE))
            .map(|(qname, id)| {
                serde_json::json!({
                    "name": qname.to_string(),
                    "kind": if schema.type_definition(id).is_simple() { "simple" } else { "complex" },
                })
            })
            .collect();
        let output = serde_json::json!({
            "targetNamespace": schema.target_namespace(),
            "dependencies": dependencies,
            "elements": elements,
            "types": types,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("xsdbind v{}", xsdbind::VERSION);
    println!();
    println!("Schema Information:");
    println!(
        "  Target Namespace: {}",
        schema.target_namespace().unwrap_or("(none)")
    );
    println!("  Dependency Order: {}", dependencies.join(" -> "));

    println!("\n=== Global Elements ===");
    for (qname, id) in schema.global_elements() {
        let declaration = schema.element(id);
        let type_str = schema
            .type_name(declaration.type_id)
            .map(|t| t.to_string())
            .unwrap_or_else(|| "anonymous".to_string());
        let flag = if declaration.is_abstract { " (abstract)" } else { "" };
        println!("  {} : {}{}", qname, type_str, flag);
    }

    println!("\n=== Global Types ===");
    for (qname, id) in schema.global_types() {
        if qname.namespace.as_deref() == Some(xsdbind::XSD_NAMESPACE) {
            continue;
        }
        let kind = if schema.type_definition(id).is_simple() { "simple" } else { "complex" };
        println!("  {} ({})", qname, kind);
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn find_element(schema: &Schema, name: &str) -> Result<QName, Box<dyn std::error::Error>> {
    if name.starts_with('{') {
        return Ok(QName::parse_clark(name)?);
    }
    schema
        .global_elements()
        .map(|(qname, _)| qname.clone())
        .find(|qname| qname.local_name == name)
        .ok_or_else(|| format!("Element '{}' not found in schema", name).into())
}

#[cfg(feature = "cli")]
fn print_element_details(schema: &Schema, name: &QName, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let id = schema
        .element_by_name(name)
        .ok_or_else(|| format!("Element '{}' not found in schema", name))?;
    let declaration = schema.element(schema.resolved_element(id));
    let type_id = declaration.type_id;

    let particles: Vec<(String, String)> = schema
        .child_element_particles(type_id, true)
        .into_iter()
        .map(|particle| {
            let child = schema.element(schema.resolved_element(particle.element));
            let max = particle
                .occurs
                .max
                .map_or_else(|| "unbounded".to_string(), |max| max.to_string());
            (child.name.to_string(), format!("{}..{}", particle.occurs.min, max))
        })
        .collect();
    let attributes: Vec<String> = schema
        .attribute_declarations(type_id, true)
        .into_iter()
        .map(|attribute| schema.attribute(attribute).name.to_string())
        .collect();
    let substitutes: Vec<String> = schema
        .substitution_group(id)
        .into_iter()
        .map(|member| schema.element(member).name.to_string())
        .collect();

    if json_output {
        let json = serde_json::json!({
            "name": name.to_string(),
            "type": schema.type_name(type_id).map(|t| t.to_string()),
            "abstract": declaration.is_abstract,
            "nillable": declaration.nillable,
            "particles": particles
                .iter()
                .map(|(name, occurs)| serde_json::json!({ "name": name, "occurs": occurs }))
                .collect::<Vec<_>>(),
            "attributes": attributes,
            "substitutionGroup": substitutes,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("Element: {}", name);
    if let Some(type_name) = schema.type_name(type_id) {
        println!("  Type: {}", type_name);
    }
    println!("  Abstract: {}", declaration.is_abstract);
    println!("  Nillable: {}", declaration.nillable);
    if !particles.is_empty() {
        println!("  Particles:");
        for (child, occurs) in &particles {
            println!("    {} [{}]", child, occurs);
        }
    }
    if !attributes.is_empty() {
        println!("  Attributes:");
        for attribute in &attributes {
            println!("    {}", attribute);
        }
    }
    if !substitutes.is_empty() {
        println!("  Substitution Group:");
        for member in &substitutes {
            println!("    {}", member);
        }
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_decode(
    schema_path: PathBuf,
    file: PathBuf,
    lenient: bool,
    pretty: bool,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let properties: &[ParserProperty] = if lenient {
        &[ParserProperty::ParseUnknownElements, ParserProperty::ParseUnknownAttributes]
    } else {
        &[]
    };
    let decoder = Decoder::new(configuration(&schema_path, properties)?)?;

    let xml_content = fs::read_to_string(&file)?;
    let (name, value) = decoder.decode(xml_content.as_bytes())?;

    let output_json = serde_json::json!({ name.local_name.as_str(): value.to_json() });
    let json_str = if pretty {
        serde_json::to_string_pretty(&output_json)?
    } else {
        serde_json::to_string(&output_json)?
    };

    match output {
        Some(output_path) => fs::write(output_path, &json_str)?,
        None => println!("{}", json_str),
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_encode(
    schema_path: PathBuf,
    file: PathBuf,
    element: String,
    indent: bool,
    omit_declaration: bool,
    options_path: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let configuration = configuration(&schema_path, &[])?;
    let schema = configuration.schema()?;
    let name = find_element(&schema, &element)?;

    let mut options: EncoderOptions = match options_path {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => EncoderOptions::default(),
    };
    options.indent |= indent;
    options.omit_xml_declaration |= omit_declaration;

    let class_name = schema
        .element_by_name(&name)
        .map(|id| schema.element(schema.resolved_element(id)).type_id)
        .and_then(|type_id| schema.type_name(type_id).cloned())
        .unwrap_or_else(|| name.clone());
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&file)?)?;
    // accept both the bare content and the `{ "Root": {...} }` shape `decode` prints
    let content = match json.as_object() {
        Some(map) if map.len() == 1 && map.contains_key(&name.local_name) => &map[&name.local_name],
        _ => &json,
    };
    let value = Value::from_json(content, &Class::new(class_name));

    let encoder = Encoder::new(configuration)?.with_options(options);
    let xml = encoder.encode_as_string(&value, &name)?;

    match output {
        Some(output_path) => fs::write(output_path, &xml)?,
        None => println!("{}", xml),
    }
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}
