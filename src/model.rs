//! Zipkin v1 Thrift wire model.
//!
//! Write-side encoding of the v1 span schema (`Span`, `Annotation`,
//! `BinaryAnnotation`, `Endpoint`). Only the write half exists; the client
//! never reads from the collector.

use std::time::{SystemTime, UNIX_EPOCH};

use thrift::protocol::{
    TFieldIdentifier, TListIdentifier, TOutputProtocol, TStructIdentifier, TType,
};

use crate::span::{Annotation, BinaryAnnotation, Span};

/// Microseconds since the Unix epoch, clamped to zero for pre-epoch times.
fn epoch_micros(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as i64)
        .unwrap_or(0)
}

pub(crate) fn write_span(span: &Span, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
    o_prot.write_struct_begin(&TStructIdentifier::new("Span"))?;

    o_prot.write_field_begin(&TFieldIdentifier::new("trace_id", TType::I64, 1))?;
    o_prot.write_i64(span.metadata.trace_id.to_u64() as i64)?;
    o_prot.write_field_end()?;

    o_prot.write_field_begin(&TFieldIdentifier::new("name", TType::String, 3))?;
    o_prot.write_string(&span.rpc_name)?;
    o_prot.write_field_end()?;

    o_prot.write_field_begin(&TFieldIdentifier::new("id", TType::I64, 4))?;
    o_prot.write_i64(span.metadata.span_id.to_u64() as i64)?;
    o_prot.write_field_end()?;

    if let Some(parent_id) = span.metadata.parent_id {
        o_prot.write_field_begin(&TFieldIdentifier::new("parent_id", TType::I64, 5))?;
        o_prot.write_i64(parent_id.to_u64() as i64)?;
        o_prot.write_field_end()?;
    }

    o_prot.write_field_begin(&TFieldIdentifier::new("annotations", TType::List, 6))?;
    o_prot.write_list_begin(&TListIdentifier::new(
        TType::Struct,
        span.annotations.len() as i32,
    ))?;
    for annotation in &span.annotations {
        write_annotation(annotation, &span.service_name, o_prot)?;
    }
    o_prot.write_list_end()?;
    o_prot.write_field_end()?;

    o_prot.write_field_begin(&TFieldIdentifier::new(
        "binary_annotations",
        TType::List,
        8,
    ))?;
    o_prot.write_list_begin(&TListIdentifier::new(
        TType::Struct,
        span.binary_annotations.len() as i32,
    ))?;
    for annotation in &span.binary_annotations {
        write_binary_annotation(annotation, &span.service_name, o_prot)?;
    }
    o_prot.write_list_end()?;
    o_prot.write_field_end()?;

    o_prot.write_field_begin(&TFieldIdentifier::new("debug", TType::Bool, 9))?;
    o_prot.write_bool(span.metadata.force_sampling)?;
    o_prot.write_field_end()?;

    o_prot.write_field_begin(&TFieldIdentifier::new("timestamp", TType::I64, 10))?;
    o_prot.write_i64(epoch_micros(span.start_time))?;
    o_prot.write_field_end()?;

    if let Some(duration) = span.duration() {
        o_prot.write_field_begin(&TFieldIdentifier::new("duration", TType::I64, 11))?;
        o_prot.write_i64(duration.as_micros() as i64)?;
        o_prot.write_field_end()?;
    }

    o_prot.write_field_stop()?;
    o_prot.write_struct_end()
}

fn write_annotation(
    annotation: &Annotation,
    service_name: &str,
    o_prot: &mut dyn TOutputProtocol,
) -> thrift::Result<()> {
    o_prot.write_struct_begin(&TStructIdentifier::new("Annotation"))?;

    o_prot.write_field_begin(&TFieldIdentifier::new("timestamp", TType::I64, 1))?;
    o_prot.write_i64(epoch_micros(annotation.timestamp))?;
    o_prot.write_field_end()?;

    o_prot.write_field_begin(&TFieldIdentifier::new("value", TType::String, 2))?;
    o_prot.write_string(&annotation.value)?;
    o_prot.write_field_end()?;

    o_prot.write_field_begin(&TFieldIdentifier::new("host", TType::Struct, 3))?;
    write_endpoint(service_name, o_prot)?;
    o_prot.write_field_end()?;

    o_prot.write_field_stop()?;
    o_prot.write_struct_end()
}

fn write_binary_annotation(
    annotation: &BinaryAnnotation,
    service_name: &str,
    o_prot: &mut dyn TOutputProtocol,
) -> thrift::Result<()> {
    o_prot.write_struct_begin(&TStructIdentifier::new("BinaryAnnotation"))?;

    o_prot.write_field_begin(&TFieldIdentifier::new("key", TType::String, 1))?;
    o_prot.write_string(&annotation.key)?;
    o_prot.write_field_end()?;

    o_prot.write_field_begin(&TFieldIdentifier::new("value", TType::String, 2))?;
    o_prot.write_bytes(&annotation.value.to_bytes())?;
    o_prot.write_field_end()?;

    o_prot.write_field_begin(&TFieldIdentifier::new("annotation_type", TType::I32, 3))?;
    o_prot.write_i32(annotation.value.type_code())?;
    o_prot.write_field_end()?;

    o_prot.write_field_begin(&TFieldIdentifier::new("host", TType::Struct, 4))?;
    write_endpoint(service_name, o_prot)?;
    o_prot.write_field_end()?;

    o_prot.write_field_stop()?;
    o_prot.write_struct_end()
}

fn write_endpoint(service_name: &str, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
    o_prot.write_struct_begin(&TStructIdentifier::new("Endpoint"))?;

    o_prot.write_field_begin(&TFieldIdentifier::new("ipv4", TType::I32, 1))?;
    o_prot.write_i32(0)?;
    o_prot.write_field_end()?;

    o_prot.write_field_begin(&TFieldIdentifier::new("port", TType::I16, 2))?;
    o_prot.write_i16(0)?;
    o_prot.write_field_end()?;

    o_prot.write_field_begin(&TFieldIdentifier::new("service_name", TType::String, 3))?;
    o_prot.write_string(service_name)?;
    o_prot.write_field_end()?;

    o_prot.write_field_stop()?;
    o_prot.write_struct_end()
}
