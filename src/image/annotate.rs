use crate::detect::DetectionRecord;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

/// 边框颜色
pub const BORDER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// 边框宽度（像素）
pub const BORDER_WIDTH: u32 = 2;

/// 在原图副本上绘制所有检测框的轮廓
pub fn draw_boxes(image: &DynamicImage, boxes: &[DetectionRecord]) -> RgbImage {
    let mut canvas = image.to_rgb8();

    for record in boxes {
        // 宽高为0的框也画出一条线
        let base = Rect::at(record.x1 as i32, record.y1 as i32)
            .of_size(record.width.max(1), record.height.max(1));

        // 向内加粗，保证线条落在框内
        for i in 0..BORDER_WIDTH {
            if base.width() <= 2 * i || base.height() <= 2 * i {
                break;
            }
            let inset = Rect::at(base.left() + i as i32, base.top() + i as i32)
                .of_size(base.width() - 2 * i, base.height() - 2 * i);
            draw_hollow_rect_mut(&mut canvas, inset, BORDER_COLOR);
        }
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(x1: u32, y1: u32, x2: u32, y2: u32) -> DetectionRecord {
        DetectionRecord {
            x1,
            y1,
            x2,
            y2,
            label: "stitch".to_string(),
            confidence: 0.9,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    #[test]
    fn test_draws_outline_only() {
        let image = DynamicImage::new_rgb8(40, 40);
        let out = draw_boxes(&image, &[record(10, 10, 30, 30)]);

        assert_eq!(out.dimensions(), (40, 40));
        assert_eq!(*out.get_pixel(10, 10), BORDER_COLOR);
        assert_eq!(*out.get_pixel(11, 20), BORDER_COLOR);
        assert_eq!(*out.get_pixel(20, 20), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_no_boxes_keeps_image() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 7, Rgb([9, 8, 7])));
        let out = draw_boxes(&image, &[]);
        assert_eq!(out, image.to_rgb8());
    }

    #[test]
    fn test_box_on_image_edge() {
        let image = DynamicImage::new_rgb8(20, 20);
        let out = draw_boxes(&image, &[record(0, 0, 20, 20)]);
        assert_eq!(*out.get_pixel(0, 0), BORDER_COLOR);
        assert_eq!(*out.get_pixel(19, 19), BORDER_COLOR);
    }
}
