/*
 *  canvas/json.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Canonical canvas JSON schema - import/export
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

//! Wire schema:
//!
//! ```json
//! {
//!   "id": "...", "name": "...", "background_color": 0..6,
//!   "created_time": u32, "modified_time": u32,
//!   "elements": [{
//!     "id": "...", "type": 0|1|2|3|4,
//!     "x": i16, "y": i16, "width": u16, "height": u16,
//!     "z_index": 0..255, "visible": bool,
//!     "props": { ...per kind... }
//!   }]
//! }
//! ```
//!
//! Field order is preserved on export; unknown fields are ignored on
//! import; element lists beyond the 50-element cap are truncated.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canvas::model::{
    validate_id, Bounds, Canvas, Element, ElementKind, ImageProps, ShapeProps, TextProps,
    MAX_ELEMENTS,
};
use crate::panel::Color;

/// Import failure with a reason suitable for an HTTP 400 body.
#[derive(Debug)]
pub struct SchemaError(pub String);

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Canvas schema error: {}", self.0)
    }
}

impl std::error::Error for SchemaError {}

#[derive(Serialize, Deserialize)]
struct CanvasDoc {
    id: String,
    name: String,
    background_color: Color,
    created_time: u32,
    modified_time: u32,
    elements: Vec<ElementDoc>,
}

#[derive(Serialize, Deserialize)]
struct ElementDoc {
    id: String,
    #[serde(rename = "type")]
    type_tag: u8,
    x: i16,
    y: i16,
    width: u16,
    height: u16,
    z_index: u8,
    #[serde(default = "default_visible")]
    visible: bool,
    props: Value,
}

fn default_visible() -> bool {
    true
}

/// Serialize a canvas to its canonical JSON form.
pub fn export(canvas: &Canvas) -> String {
    let doc = CanvasDoc {
        id: canvas.id.clone(),
        name: canvas.name.clone(),
        background_color: canvas.background_color,
        created_time: canvas.created_time,
        modified_time: canvas.modified_time,
        elements: canvas.elements.iter().map(element_to_doc).collect(),
    };
    // String-keyed JSON only; serialization cannot fail
    serde_json::to_string(&doc).expect("canvas serialization")
}

fn element_to_doc(element: &Element) -> ElementDoc {
    let props = match &element.kind {
        ElementKind::Text(p) => serde_json::to_value(p),
        ElementKind::Image(p) => serde_json::to_value(p),
        ElementKind::Rect(p) | ElementKind::Line(p) | ElementKind::Circle(p) => {
            serde_json::to_value(p)
        }
    }
    .expect("element props serialization");

    ElementDoc {
        id: element.id.clone(),
        type_tag: element.kind.type_tag(),
        x: element.bounds.x,
        y: element.bounds.y,
        width: element.bounds.w,
        height: element.bounds.h,
        z_index: element.z_index,
        visible: element.visible,
        props,
    }
}

/// Parse a canonical JSON document into a canvas.
pub fn import(json_str: &str) -> Result<Canvas, SchemaError> {
    let doc: CanvasDoc =
        serde_json::from_str(json_str).map_err(|e| SchemaError(e.to_string()))?;

    if !validate_id(&doc.id) {
        return Err(SchemaError(format!("invalid canvas id '{}'", doc.id)));
    }

    let mut elements = Vec::new();
    for elem_doc in doc.elements.into_iter().take(MAX_ELEMENTS) {
        elements.push(doc_to_element(elem_doc)?);
    }

    Ok(Canvas {
        id: doc.id,
        name: doc.name,
        background_color: doc.background_color,
        created_time: doc.created_time,
        modified_time: doc.modified_time,
        elements,
    })
}

/// Parse a single element object (the `element` field of the web API's
/// add-element body) using the same schema as canvas documents.
pub fn parse_element(value: Value) -> Result<Element, SchemaError> {
    let doc: ElementDoc =
        serde_json::from_value(value).map_err(|e| SchemaError(e.to_string()))?;
    doc_to_element(doc)
}

fn doc_to_element(doc: ElementDoc) -> Result<Element, SchemaError> {
    if !validate_id(&doc.id) {
        return Err(SchemaError(format!("invalid element id '{}'", doc.id)));
    }

    let kind = match doc.type_tag {
        0 => ElementKind::Text(parse_props::<TextProps>(&doc)?),
        1 => ElementKind::Image(parse_props::<ImageProps>(&doc)?),
        2 => ElementKind::Rect(parse_props::<ShapeProps>(&doc)?),
        3 => ElementKind::Line(parse_props::<ShapeProps>(&doc)?),
        4 => ElementKind::Circle(parse_props::<ShapeProps>(&doc)?),
        t => return Err(SchemaError(format!("unknown element type {}", t))),
    };

    Ok(Element {
        id: doc.id,
        bounds: Bounds {
            x: doc.x,
            y: doc.y,
            w: doc.width,
            h: doc.height,
        },
        z_index: doc.z_index,
        visible: doc.visible,
        kind,
    })
}

fn parse_props<T: serde::de::DeserializeOwned>(doc: &ElementDoc) -> Result<T, SchemaError> {
    serde_json::from_value(doc.props.clone())
        .map_err(|e| SchemaError(format!("element '{}' props: {}", doc.id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::model::{FontSize, TextAlign};

    fn sample_canvas() -> Canvas {
        let mut canvas = Canvas::new("dash", "Dashboard", 1700000000);
        canvas.elements.push(Element {
            id: "greeting".to_string(),
            bounds: Bounds { x: 100, y: 200, w: 80, h: 20 },
            z_index: 3,
            visible: true,
            kind: ElementKind::Text(TextProps {
                text: "Hi".to_string(),
                font_size: FontSize::Medium,
                color: Color::Black,
                align: TextAlign::Center,
                bold: false,
                italic: false,
            }),
        });
        canvas
    }

    #[test]
    fn test_export_import_round_trip() {
        let canvas = sample_canvas();
        let json = export(&canvas);
        let parsed = import(&json).unwrap();
        assert_eq!(parsed, canvas);

        // Re-export is byte-identical
        assert_eq!(export(&parsed), json);
    }

    #[test]
    fn test_export_field_shapes() {
        let json = export(&sample_canvas());
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["background_color"], 1);
        let elem = &value["elements"][0];
        assert_eq!(elem["type"], 0);
        assert_eq!(elem["x"], 100);
        assert_eq!(elem["width"], 80);
        assert_eq!(elem["props"]["font_size"], 16);
        assert_eq!(elem["props"]["align"], 1);
    }

    #[test]
    fn test_import_ignores_unknown_fields() {
        let json = r#"{
            "id": "c", "name": "n", "background_color": 1,
            "created_time": 0, "modified_time": 0,
            "future_field": {"nested": true},
            "elements": [{
                "id": "e", "type": 2, "x": 0, "y": 0, "width": 5, "height": 5,
                "z_index": 0, "visible": true, "extra": 42,
                "props": {"fill_color": 2, "border_color": 0, "border_width": 0,
                          "filled": true, "someday": "maybe"}
            }]
        }"#;
        let canvas = import(json).unwrap();
        assert_eq!(canvas.elements.len(), 1);
        assert!(matches!(canvas.elements[0].kind, ElementKind::Rect(_)));
    }

    #[test]
    fn test_import_truncates_excess_elements() {
        let mut elements = Vec::new();
        for i in 0..60 {
            elements.push(format!(
                r#"{{"id": "e{}", "type": 3, "x": 0, "y": 0, "width": 1, "height": 1,
                     "z_index": 0, "visible": true,
                     "props": {{"fill_color": 0, "border_color": 0, "border_width": 0, "filled": false}}}}"#,
                i
            ));
        }
        let json = format!(
            r#"{{"id": "big", "name": "Big", "background_color": 1,
                 "created_time": 0, "modified_time": 0, "elements": [{}]}}"#,
            elements.join(",")
        );
        let canvas = import(&json).unwrap();
        assert_eq!(canvas.elements.len(), MAX_ELEMENTS);
    }

    #[test]
    fn test_import_rejects_bad_input() {
        assert!(import("not json").is_err());
        assert!(import(r#"{"id": "", "name": "n", "background_color": 1,
                           "created_time": 0, "modified_time": 0, "elements": []}"#)
            .is_err());
        assert!(import(r#"{"id": "c", "name": "n", "background_color": 9,
                           "created_time": 0, "modified_time": 0, "elements": []}"#)
            .is_err());
        // Unknown element type
        assert!(import(r#"{"id": "c", "name": "n", "background_color": 1,
                           "created_time": 0, "modified_time": 0,
                           "elements": [{"id": "e", "type": 7, "x": 0, "y": 0,
                                         "width": 1, "height": 1, "z_index": 0,
                                         "visible": true, "props": {}}]}"#)
            .is_err());
    }
}
