/// WGSL shader for terrain chunks: lambert lighting from a sun direction,
/// per-vertex color, distance fog toward the clear color.
pub const TERRAIN_SHADER: &str = r#"
struct Uniforms {
    view_proj: mat4x4<f32>,
    sun_direction: vec4<f32>,
    camera_position: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) color: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) color: vec3<f32>,
};

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = uniforms.view_proj * vec4<f32>(vertex.position, 1.0);
    out.world_position = vertex.position;
    out.world_normal = vertex.normal;
    out.color = vertex.color;
    return out;
}

const FOG_COLOR: vec3<f32> = vec3<f32>(0.55, 0.7, 0.85);
const FOG_START: f32 = 150.0;
const FOG_END: f32 = 280.0;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let light_dir = normalize(uniforms.sun_direction.xyz);
    let ambient = 0.3;
    let diffuse = max(dot(normalize(in.world_normal), light_dir), 0.0);
    let lit = in.color * (ambient + diffuse * 0.7);

    let distance = length(in.world_position - uniforms.camera_position.xyz);
    let fog = clamp((distance - FOG_START) / (FOG_END - FOG_START), 0.0, 1.0);
    return vec4<f32>(mix(lit, FOG_COLOR, fog), 1.0);
}
"#;
