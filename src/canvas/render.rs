/*
 *  canvas/render.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Deterministic rasterization of canvas elements into the framebuffer
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

use crate::canvas::model::{Canvas, Element, ElementKind, FontSize, ShapeProps, TextProps};
use crate::panel::{Color, FrameBuffer};

/// Render a whole canvas: background fill, then elements in ascending
/// z-index (stable for equal indices), skipping invisible ones.
pub fn render_canvas(fb: &mut FrameBuffer, canvas: &Canvas) {
    fb.clear(canvas.background_color);

    let mut order: Vec<&Element> = canvas.elements.iter().collect();
    order.sort_by_key(|e| e.z_index);

    for element in order {
        if !element.visible {
            continue;
        }
        render_element(fb, element);
    }
}

/// Render a single element according to its kind.
pub fn render_element(fb: &mut FrameBuffer, element: &Element) {
    match &element.kind {
        ElementKind::Text(props) => render_text(fb, element, props),
        ElementKind::Image(_) => render_image_placeholder(fb, element),
        ElementKind::Rect(props) => render_rect(fb, element, props),
        ElementKind::Line(props) => render_line(fb, element, props),
        ElementKind::Circle(props) => render_circle(fb, element, props),
    }
}

/// Placeholder glyph rendering: one filled cell per character.
///
/// Cells are `font_size/2` wide and `font_size` tall with a one-pixel gap.
/// A real font rasterizer can replace this without changing the API.
pub fn draw_text(fb: &mut FrameBuffer, x: i32, y: i32, text: &str, font_size: FontSize, color: Color) {
    let char_width = (font_size.px() / 2) as i32;
    let char_height = font_size.px() as u16;

    for (i, _ch) in text.chars().enumerate() {
        fb.draw_rect(
            x + i as i32 * char_width,
            y,
            (char_width - 1).max(1) as u16,
            char_height,
            color,
            true,
        );
    }
}

fn render_text(fb: &mut FrameBuffer, element: &Element, props: &TextProps) {
    use crate::canvas::model::TextAlign;

    let char_width = (props.font_size.px() / 2) as i32;
    let text_width = props.text.chars().count() as i32 * char_width;

    let x_start = match props.align {
        TextAlign::Left => element.bounds.x as i32,
        TextAlign::Center => element.bounds.x as i32 + (element.bounds.w as i32 - text_width) / 2,
        TextAlign::Right => element.bounds.x as i32 + element.bounds.w as i32 - text_width,
    };

    draw_text(fb, x_start, element.bounds.y as i32, &props.text, props.font_size, props.color);
}

/// No decoder yet: an outlined rectangle with both diagonals marks the spot.
fn render_image_placeholder(fb: &mut FrameBuffer, element: &Element) {
    let x = element.bounds.x as i32;
    let y = element.bounds.y as i32;
    let w = element.bounds.w as i32;
    let h = element.bounds.h as i32;

    fb.draw_rect(x, y, element.bounds.w, element.bounds.h, Color::Blue, false);
    fb.draw_line(x, y, x + w, y + h, Color::Blue);
    fb.draw_line(x + w, y, x, y + h, Color::Blue);
}

fn render_rect(fb: &mut FrameBuffer, element: &Element, props: &ShapeProps) {
    fb.draw_rect(
        element.bounds.x as i32,
        element.bounds.y as i32,
        element.bounds.w,
        element.bounds.h,
        props.fill_color,
        props.filled,
    );
    if props.border_width > 0 {
        fb.draw_rect(
            element.bounds.x as i32,
            element.bounds.y as i32,
            element.bounds.w,
            element.bounds.h,
            props.border_color,
            false,
        );
    }
}

fn render_line(fb: &mut FrameBuffer, element: &Element, props: &ShapeProps) {
    fb.draw_line(
        element.bounds.x as i32,
        element.bounds.y as i32,
        element.bounds.x as i32 + element.bounds.w as i32,
        element.bounds.y as i32 + element.bounds.h as i32,
        props.fill_color,
    );
}

fn render_circle(fb: &mut FrameBuffer, element: &Element, props: &ShapeProps) {
    let cx = element.bounds.x as i32 + element.bounds.w as i32 / 2;
    let cy = element.bounds.y as i32 + element.bounds.h as i32 / 2;
    let radius = (element.bounds.w.min(element.bounds.h) / 2) as i32;
    fb.draw_circle(cx, cy, radius, props.fill_color, props.filled);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::model::{Bounds, TextAlign};

    fn rect_element(id: &str, x: i16, y: i16, w: u16, h: u16, z: u8, color: Color) -> Element {
        Element {
            id: id.to_string(),
            bounds: Bounds { x, y, w, h },
            z_index: z,
            visible: true,
            kind: ElementKind::Rect(ShapeProps {
                fill_color: color,
                border_color: Color::Black,
                border_width: 0,
                filled: true,
            }),
        }
    }

    #[test]
    fn test_z_ordering() {
        // A (z=1, red) under B (z=2, blue); overlap resolves to blue
        let mut canvas = Canvas::new("z", "Z order", 0);
        canvas.elements.push(rect_element("b", 5, 0, 10, 10, 2, Color::Blue));
        canvas.elements.push(rect_element("a", 0, 0, 10, 10, 1, Color::Red));

        let mut fb = FrameBuffer::new();
        render_canvas(&mut fb, &canvas);

        assert_eq!(fb.get_pixel(7, 5), Some(Color::Blue));
        assert_eq!(fb.get_pixel(2, 5), Some(Color::Red));
    }

    #[test]
    fn test_invisible_elements_skipped() {
        let mut canvas = Canvas::new("v", "Visibility", 0);
        let mut hidden = rect_element("hidden", 0, 0, 10, 10, 0, Color::Black);
        hidden.visible = false;
        canvas.elements.push(hidden);

        let mut fb = FrameBuffer::new();
        render_canvas(&mut fb, &canvas);
        assert_eq!(fb.get_pixel(5, 5), Some(Color::White));
    }

    #[test]
    fn test_background_fill() {
        let mut canvas = Canvas::new("bg", "Background", 0);
        canvas.background_color = Color::Yellow;

        let mut fb = FrameBuffer::new();
        render_canvas(&mut fb, &canvas);
        assert_eq!(fb.get_pixel(0, 0), Some(Color::Yellow));
        assert_eq!(fb.get_pixel(599, 447), Some(Color::Yellow));
    }

    #[test]
    fn test_text_cells_honor_alignment() {
        let text = |align| Element {
            id: "t".to_string(),
            bounds: Bounds { x: 100, y: 100, w: 100, h: 20 },
            z_index: 0,
            visible: true,
            kind: ElementKind::Text(TextProps {
                text: "Hi".to_string(),
                font_size: FontSize::Medium,
                color: Color::Black,
                align,
                bold: false,
                italic: false,
            }),
        };

        // Left: first cell starts at bounds.x
        let mut fb = FrameBuffer::new();
        render_element(&mut fb, &text(TextAlign::Left));
        assert_eq!(fb.get_pixel(100, 100), Some(Color::Black));

        // Right: text (2 chars * 8 px) ends at bounds right edge
        let mut fb = FrameBuffer::new();
        render_element(&mut fb, &text(TextAlign::Right));
        assert_eq!(fb.get_pixel(100, 100), Some(Color::White));
        assert_eq!(fb.get_pixel(184, 100), Some(Color::Black));

        // Center: shifted by (100 - 16) / 2 = 42
        let mut fb = FrameBuffer::new();
        render_element(&mut fb, &text(TextAlign::Center));
        assert_eq!(fb.get_pixel(142, 100), Some(Color::Black));
    }

    #[test]
    fn test_image_placeholder_outline_and_diagonals() {
        let element = Element {
            id: "img".to_string(),
            bounds: Bounds { x: 10, y: 10, w: 20, h: 20 },
            z_index: 0,
            visible: true,
            kind: ElementKind::Image(crate::canvas::model::ImageProps {
                image_id: "photo".to_string(),
                format: crate::canvas::model::ImageFormat::Png,
                maintain_aspect: true,
                opacity: 255,
            }),
        };

        let mut fb = FrameBuffer::new();
        render_element(&mut fb, &element);
        assert_eq!(fb.get_pixel(10, 10), Some(Color::Blue));
        assert_eq!(fb.get_pixel(20, 20), Some(Color::Blue));
    }

    #[test]
    fn test_circle_geometry() {
        let element = Element {
            id: "c".to_string(),
            bounds: Bounds { x: 100, y: 100, w: 40, h: 20 },
            z_index: 0,
            visible: true,
            kind: ElementKind::Circle(ShapeProps {
                fill_color: Color::Green,
                border_color: Color::Black,
                border_width: 0,
                filled: true,
            }),
        };

        let mut fb = FrameBuffer::new();
        render_element(&mut fb, &element);
        // Center = (120, 110), radius = min(40,20)/2 = 10
        assert_eq!(fb.get_pixel(120, 110), Some(Color::Green));
        assert_eq!(fb.get_pixel(129, 110), Some(Color::Green));
        assert_eq!(fb.get_pixel(135, 110), Some(Color::White));
    }

    #[test]
    fn test_rect_border_over_fill() {
        let element = Element {
            id: "r".to_string(),
            bounds: Bounds { x: 0, y: 0, w: 10, h: 10 },
            z_index: 0,
            visible: true,
            kind: ElementKind::Rect(ShapeProps {
                fill_color: Color::Red,
                border_color: Color::Black,
                border_width: 1,
                filled: true,
            }),
        };

        let mut fb = FrameBuffer::new();
        render_element(&mut fb, &element);
        assert_eq!(fb.get_pixel(0, 0), Some(Color::Black));
        assert_eq!(fb.get_pixel(5, 5), Some(Color::Red));
    }
}
