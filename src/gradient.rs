//! 可分离的 3x3 Sobel 梯度算子
//!
//! 平滑核为 [1, 2, 1] / 4（整数截断），导数核为 [-1, 0, 1]。

use thiserror::Error;

use crate::mat::{BgrImage, GradImage};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GradientError {
    #[error("image is empty")]
    Empty,
    #[error("gradient sizes differ: {0:?} vs {1:?}")]
    SizeMismatch((usize, usize), (usize, usize)),
}

#[inline(always)]
fn smooth(a: u8, b: u8, c: u8) -> i16 {
    ((a as u16 + 2 * b as u16 + c as u16) / 4) as i16
}

/// 水平方向梯度：先纵向平滑，再横向求导，右减左
///
/// 平滑时首末行直接复制原图，求导时首末列置零。
pub fn grad_x(src: &BgrImage) -> Result<GradImage, GradientError> {
    if src.is_empty() {
        return Err(GradientError::Empty);
    }
    let (w, h) = (src.width(), src.height());
    let stride = w * 3;

    let mut tmp = vec![0i16; w * h * 3];
    for y in 0..h {
        let out = &mut tmp[y * stride..(y + 1) * stride];
        if y == 0 || y == h - 1 {
            for (o, &s) in out.iter_mut().zip(src.row(y)) {
                *o = s as i16;
            }
            continue;
        }
        let (up, mid, down) = (src.row(y - 1), src.row(y), src.row(y + 1));
        for i in 0..stride {
            out[i] = smooth(up[i], mid[i], down[i]);
        }
    }

    let mut dst = GradImage::zeros(w, h);
    let data = dst.data_mut();
    for y in 0..h {
        let row = &tmp[y * stride..(y + 1) * stride];
        let out = &mut data[y * stride..(y + 1) * stride];
        for x in 1..w.saturating_sub(1) {
            for c in 0..3 {
                out[x * 3 + c] = row[(x + 1) * 3 + c] - row[(x - 1) * 3 + c];
            }
        }
    }
    Ok(dst)
}

/// 垂直方向梯度：先横向平滑，再纵向求导，上减下（向上为正）
///
/// 平滑时首末列直接复制原图，求导时首末行置零。
pub fn grad_y(src: &BgrImage) -> Result<GradImage, GradientError> {
    if src.is_empty() {
        return Err(GradientError::Empty);
    }
    let (w, h) = (src.width(), src.height());
    let stride = w * 3;

    let mut tmp = vec![0i16; w * h * 3];
    for y in 0..h {
        let row = src.row(y);
        let out = &mut tmp[y * stride..(y + 1) * stride];
        for x in 0..w {
            for c in 0..3 {
                let i = x * 3 + c;
                out[i] = if x == 0 || x == w - 1 {
                    row[i] as i16
                } else {
                    smooth(row[i - 3], row[i], row[i + 3])
                };
            }
        }
    }

    let mut dst = GradImage::zeros(w, h);
    let data = dst.data_mut();
    for y in 1..h.saturating_sub(1) {
        let up = &tmp[(y - 1) * stride..y * stride];
        let down = &tmp[(y + 1) * stride..(y + 2) * stride];
        let out = &mut data[y * stride..(y + 1) * stride];
        for i in 0..stride {
            out[i] = up[i] - down[i];
        }
    }
    Ok(dst)
}

/// 逐通道计算梯度幅值 sqrt(gx² + gy²)，截断到 [0, 255]
pub fn magnitude(gx: &GradImage, gy: &GradImage) -> Result<BgrImage, GradientError> {
    let (sa, sb) = ((gx.width(), gx.height()), (gy.width(), gy.height()));
    if sa != sb {
        return Err(GradientError::SizeMismatch(sa, sb));
    }
    if gx.data().is_empty() {
        return Err(GradientError::Empty);
    }
    let data = gx
        .data()
        .iter()
        .zip(gy.data())
        .map(|(&a, &b)| {
            let (a, b) = (a as f32, b as f32);
            (a * a + b * b).sqrt().clamp(0., 255.) as u8
        })
        .collect();
    Ok(BgrImage::new(sa.0, sa.1, data).expect("same layout as the gradient images"))
}
