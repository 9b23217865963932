/// debug label 使用的颜色
pub struct LabelColor;
impl LabelColor {
    const RED: glam::Vec4 = glam::vec4(1.0, 0.0, 0.0, 1.0);
    const GREEN: glam::Vec4 = glam::vec4(0.0, 1.0, 0.0, 1.0);
    const BLUE: glam::Vec4 = glam::vec4(0.0, 0.0, 1.0, 1.0);

    /// dynamic rendering pass
    pub const COLOR_PASS: glam::Vec4 = Self::BLUE;
    /// image copy
    pub const COLOR_COPY: glam::Vec4 = Self::GREEN;
    /// depth 只读采样
    pub const COLOR_DEPTH_SAMPLING: glam::Vec4 = Self::RED;
}
