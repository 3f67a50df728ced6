//! Viewer that captures SteamVR devices into in-memory curves and writes
//! them as JSON on exit.

use tracking_toolkit::convert::decompose;
use tracking_toolkit::device::DeviceClass;
use tracking_toolkit::host::{CurveKey, HostScene, Keyframe, LocRot};
use tracking_toolkit::openvr_adaptor::OpenVrSource;
use tracking_toolkit::{source, CaptureConfig, CaptureSession, HostError, TimerQueue};

use kiss3d::event::{Action, Key, WindowEvent};
use kiss3d::scene::SceneNode;
use kiss3d::window::Window;
use log::*;
use nalgebra as na;
use serde::Serialize;
use simplelog::{Config, LevelFilter, SimpleLogger};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::time::Instant;

const FRAME_RATE: f64 = 24.0;

struct SceneObject {
    node: SceneNode,
    world: na::Matrix4<f32>,
    curves: BTreeMap<CurveKey, Vec<Keyframe>>,
}

impl SceneObject {
    fn new(node: SceneNode) -> Self {
        Self {
            node,
            world: na::Matrix4::identity(),
            curves: BTreeMap::new(),
        }
    }

    fn place(&mut self, world: na::Matrix4<f32>) {
        self.world = world;
        let parts = decompose(&world);
        self.node.set_local_transformation(na::Isometry3::from_parts(
            parts.translation.into(),
            parts.rotation,
        ));
        self.node
            .set_local_scale(parts.scale.x, parts.scale.y, parts.scale.z);
    }
}

/// The viewer window acting as the scene: one cube per tracker, curves kept
/// in memory until exit.
struct ViewerScene {
    objects: HashMap<String, SceneObject>,
    started: Instant,
}

#[derive(Serialize)]
struct ExportedCurve<'a> {
    object: &'a str,
    data_path: &'static str,
    index: usize,
    keyframes: &'a [Keyframe],
}

impl ViewerScene {
    fn new() -> Self {
        Self {
            objects: HashMap::new(),
            started: Instant::now(),
        }
    }

    fn object_mut(&mut self, name: &str) -> Result<&mut SceneObject, HostError> {
        self.objects
            .get_mut(name)
            .ok_or_else(|| HostError::MissingObject(name.to_owned()))
    }

    fn export(&self) -> Vec<ExportedCurve<'_>> {
        let mut exported = Vec::new();
        for (name, object) in &self.objects {
            for (key, keyframes) in &object.curves {
                exported.push(ExportedCurve {
                    object: name,
                    data_path: key.channel.data_path(),
                    index: key.index,
                    keyframes,
                });
            }
        }
        exported
    }
}

impl HostScene for ViewerScene {
    fn object_exists(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    fn world_transform(&self, name: &str) -> Option<na::Matrix4<f32>> {
        self.objects.get(name).map(|object| object.world)
    }

    fn set_world_transform(
        &mut self,
        name: &str,
        transform: &na::Matrix4<f32>,
    ) -> Result<(), HostError> {
        self.object_mut(name)?.place(*transform);
        Ok(())
    }

    fn scale(&self, name: &str) -> Option<na::Vector3<f32>> {
        self.objects
            .get(name)
            .map(|object| decompose(&object.world).scale)
    }

    fn set_scale(&mut self, name: &str, scale: na::Vector3<f32>) -> Result<(), HostError> {
        let object = self.object_mut(name)?;
        let parts = decompose(&object.world);
        let world = na::Matrix4::new_translation(&parts.translation)
            * parts.rotation.to_homogeneous()
            * na::Matrix4::new_nonuniform_scaling(&scale);
        object.place(world);
        Ok(())
    }

    fn local_loc_rot(&self, name: &str) -> Option<LocRot> {
        self.objects.get(name).map(|object| {
            let parts = decompose(&object.world);
            LocRot {
                location: parts.translation,
                rotation: parts.rotation,
            }
        })
    }

    fn set_local_loc_rot(&mut self, name: &str, loc_rot: &LocRot) -> Result<(), HostError> {
        let object = self.object_mut(name)?;
        let scale = decompose(&object.world).scale;
        let world = na::Matrix4::new_translation(&loc_rot.location)
            * loc_rot.rotation.to_homogeneous()
            * na::Matrix4::new_nonuniform_scaling(&scale);
        object.place(world);
        Ok(())
    }

    fn rename_object(&mut self, from: &str, to: &str) -> Result<(), HostError> {
        let object = self
            .objects
            .remove(from)
            .ok_or_else(|| HostError::MissingObject(from.to_owned()))?;
        self.objects.insert(to.to_owned(), object);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        false
    }

    fn frame_rate(&self) -> f64 {
        FRAME_RATE
    }

    fn current_frame(&self) -> i32 {
        (self.started.elapsed().as_secs_f64() * FRAME_RATE) as i32
    }

    fn ensure_animation_data(&mut self, name: &str) -> Result<(), HostError> {
        self.object_mut(name).map(|_| ())
    }

    fn has_curve(&self, name: &str, key: CurveKey) -> bool {
        self.objects
            .get(name)
            .map_or(false, |object| object.curves.contains_key(&key))
    }

    fn remove_curve(&mut self, name: &str, key: CurveKey) -> bool {
        self.objects
            .get_mut(name)
            .and_then(|object| object.curves.remove(&key))
            .is_some()
    }

    fn new_curve(&mut self, name: &str, key: CurveKey) -> Result<(), HostError> {
        self.object_mut(name)?.curves.insert(key, Vec::new());
        Ok(())
    }

    fn set_keyframes(
        &mut self,
        name: &str,
        key: CurveKey,
        keyframes: &[Keyframe],
    ) -> Result<(), HostError> {
        self.object_mut(name)?
            .curves
            .insert(key, keyframes.to_vec());
        Ok(())
    }

    // no armatures in the viewer
    fn set_armature_rest_pose(&mut self, _rest: bool) {}

    fn remove_bone_constraint(&mut self, _armature: &str, _bone: &str, _constraint: &str) -> bool {
        false
    }

    fn add_copy_transforms_constraint(
        &mut self,
        armature: &str,
        bone: &str,
        _constraint: &str,
        _target: &str,
    ) -> Result<(), HostError> {
        Err(HostError::MissingBone {
            armature: armature.to_owned(),
            bone: bone.to_owned(),
        })
    }
}

fn add_ground_plane(window: &mut Window) {
    let size = 0.5;
    for i in 0..4 {
        for j in 0..4 {
            let mut cube = window.add_cube(size, size, 0.001);
            if (i + j) % 2 == 0 {
                cube.set_color(1.0, 0.3, 0.2);
            } else {
                cube.set_color(0.5, 0.04, 0.17);
            }
            let distance = (1_f32.powi(2) + 1_f32.powi(2)).sqrt();
            let x_ind = j as f32 - distance;
            let y_ind = i as f32 - distance;
            cube.set_local_translation(na::Translation3::new(size * x_ind, size * y_ind, 0.0));
        }
    }
}

/// Adds a cube and a joint marker for every tracker that has no object yet.
fn add_tracker_objects(window: &mut Window, scene: &mut ViewerScene, session: &CaptureSession) {
    let config = session.config();
    for device in session.devices().iter() {
        if scene.object_exists(&device.name) {
            continue;
        }
        let mut node = window.add_cube(0.1, 0.1, 0.1);
        match device.class {
            DeviceClass::Controller => node.set_color(0.0, 0.0, 1.0),
            DeviceClass::Tracker => node.set_color(0.0, 1.0, 0.0),
            DeviceClass::HMD => node.set_color(1.0, 1.0, 0.0),
            DeviceClass::Other => node.set_color(1.0, 0.0, 0.0),
        }
        let mut joint = node.add_cube(0.03, 0.03, 0.03);
        joint.set_color(1.0, 1.0, 1.0);

        scene
            .objects
            .insert(config.joint_name(&device.name), SceneObject::new(joint));
        scene
            .objects
            .insert(device.name.clone(), SceneObject::new(node));
    }
}

fn status_text(session: &CaptureSession) -> String {
    let mut text = format!(
        "active: {}  recording: {}  calibration: {:?}\n",
        session.is_enabled(),
        session.is_recording(),
        session.calibration_stage()
    );
    for device in session.devices().iter() {
        text.push_str(&format!(
            "{} {} ({}){}\n",
            device.class,
            device.name,
            device.serial,
            if device.connected { "" } else { " disconnected" }
        ));
    }
    text.push_str("[R] record  [C] calibrate  [L] reload trackers");
    text
}

fn main() -> anyhow::Result<()> {
    SimpleLogger::init(LevelFilter::Info, Config::default())?;
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => CaptureConfig::load(path)?,
        None => CaptureConfig::default(),
    };
    let output = args.next().unwrap_or_else(|| String::from("recording.json"));

    let white = na::Point3::new(1.0, 1.0, 1.0);
    let mut window = Window::new("Tracking toolkit");
    window.set_background_color(0.5, 0.5, 0.5);
    add_ground_plane(&mut window);

    let source = source::shared(OpenVrSource::new()?);
    let mut session = CaptureSession::new(source, config);
    let mut scene = ViewerScene::new();
    let mut timers = TimerQueue::new();

    session.toggle_active(&mut scene, &mut timers)?;
    add_tracker_objects(&mut window, &mut scene, &session);

    while window.render() {
        let pressed: Vec<Key> = window
            .events()
            .iter()
            .filter_map(|event| match event.value {
                WindowEvent::Key(key, Action::Press, _) => Some(key),
                _ => None,
            })
            .collect();

        for key in pressed {
            let result = match key {
                Key::R => session.toggle_recording(&mut scene, &mut timers),
                Key::C => session
                    .toggle_calibration(&mut scene, &mut timers)
                    .map(|_| ()),
                Key::L => session.load_trackers(false).map(|_| ()),
                _ => Ok(()),
            };
            if let Err(error) = result {
                error!("{}", error);
            }
        }
        add_tracker_objects(&mut window, &mut scene, &session);

        timers.run_due(Instant::now(), &mut scene);

        window.draw_text(
            &status_text(&session),
            &na::Point2::new(1.0, 1.0),
            40.0,
            &kiss3d::text::Font::default(),
            &white,
        );
    }

    if session.is_recording() {
        session.stop_recording(&mut scene, &mut timers)?;
    }
    session.stop_preview(&mut timers);

    let curves = scene.export();
    if !curves.is_empty() {
        serde_json::to_writer_pretty(File::create(&output)?, &curves)?;
        info!("Wrote {} curves to {}", curves.len(), output);
    }
    Ok(())
}
