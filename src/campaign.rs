// campaign.rs - Campaign descriptors
//
// Each production campaign is one `Campaign` value: event budget, file
// count, tree location under the data root, the three templates it renders
// with their parameters, and the per-file naming rule. The generator itself
// is campaign-agnostic.

use std::fmt;
use std::str::FromStr;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::template::{Template, TemplateNames};

/// Literal replaced in a template's file name to obtain the output name.
pub const TEMPLATE_MARKER: &str = "template";

/// Job script template shared by every campaign.
pub const JOB_TEMPLATE: &str = "launch_nexus.template";

/// The files of one iteration. The first three are rendered and written;
/// the log and data files are only named (the job creates them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    InitMacro,
    ConfigMacro,
    JobScript,
    LogFile,
    DataFile,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Artifact::InitMacro   => "init macro",
            Artifact::ConfigMacro => "config macro",
            Artifact::JobScript   => "job script",
            Artifact::LogFile     => "log file",
            Artifact::DataFile    => "data file",
        })
    }
}

/// Bare file names of the five per-iteration artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub init:   String,
    pub config: String,
    pub job:    String,
    pub log:    String,
    pub data:   String,
}

/// How a campaign names the files of one iteration.
///
/// `init`, `config` and `job` replace [`TEMPLATE_MARKER`] inside the
/// corresponding template file name; `log` and `data` are complete names.
/// All five are patterns over the campaign parameters plus `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingRule {
    pub init:   &'static str,
    pub config: &'static str,
    pub job:    &'static str,
    pub log:    &'static str,
    pub data:   &'static str,
}

impl NamingRule {
    /// `<name>.{index}.mac`, `launch_nexus.{index}.sh`, `{index}.txt`,
    /// `{index}.next`.
    pub const INDEXED: NamingRule = NamingRule {
        init:   "{index}.mac",
        config: "{index}.mac",
        job:    "{index}.sh",
        log:    "{index}.txt",
        data:   "{index}.next",
    };

    pub const fn with_data(self, data: &'static str) -> NamingRule {
        NamingRule { data, ..self }
    }

    /// Bare file name of one artifact for iteration `index`.
    pub fn name(&self, artifact: Artifact, index: usize, templates: &TemplateNames, params: &Context) -> Result<String> {
        let mut ctx = params.clone();
        ctx.set("index", index);
        let fill = |pattern: &str| -> Result<String> {
            Template::parse(pattern, pattern)?.render(&ctx)
        };
        let name = match artifact {
            Artifact::InitMacro   => templates.init.replace(TEMPLATE_MARKER, &fill(self.init)?),
            Artifact::ConfigMacro => templates.config.replace(TEMPLATE_MARKER, &fill(self.config)?),
            Artifact::JobScript   => templates.job.replace(TEMPLATE_MARKER, &fill(self.job)?),
            Artifact::LogFile     => fill(self.log)?,
            Artifact::DataFile    => fill(self.data)?,
        };
        Ok(name)
    }

    /// All five names; errors are tagged with the artifact that failed.
    pub fn names(&self, index: usize, templates: &TemplateNames, params: &Context) -> Result<ArtifactNames> {
        let name = |a: Artifact| self.name(a, index, templates, params).map_err(|e| e.at(index, a));
        Ok(ArtifactNames {
            init:   name(Artifact::InitMacro)?,
            config: name(Artifact::ConfigMacro)?,
            job:    name(Artifact::JobScript)?,
            log:    name(Artifact::LogFile)?,
            data:   name(Artifact::DataFile)?,
        })
    }
}

// -----------------------------------------------------------------------------
// Variant selectors
// -----------------------------------------------------------------------------

fn lookup<T: Copy>(param: &'static str, value: &str, table: &[(&str, T)]) -> Result<T> {
    table
        .iter()
        .find(|(name, _)| *name == value)
        .map(|(_, v)| *v)
        .ok_or_else(|| Error::InvalidCampaignVariant {
            param,
            value: value.to_owned(),
            allowed: table.iter().map(|(name, _)| (*name).to_owned()).collect(),
        })
}

/// EL mesh model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshType {
    /// No mesh wires, ideal field.
    None,
    Real,
    /// Real mesh with a sagging profile.
    Sagg,
}

impl MeshType {
    const TABLE: [(&'static str, MeshType); 3] = [
        ("none", MeshType::None),
        ("real", MeshType::Real),
        ("sagg", MeshType::Sagg),
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MeshType::None => "none",
            MeshType::Real => "real",
            MeshType::Sagg => "sagg",
        }
    }
}

impl FromStr for MeshType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        lookup("meshtype", s, &Self::TABLE)
    }
}

/// Track direction relative to the EL plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Parallel,
    Perpendicular,
}

impl Orientation {
    const TABLE: [(&'static str, Orientation); 2] = [
        ("parallel", Orientation::Parallel),
        ("perpendicular", Orientation::Perpendicular),
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Parallel      => "parallel",
            Orientation::Perpendicular => "perpendicular",
        }
    }

    /// Unit momentum direction (px, py, pz).
    pub fn direction(self) -> (i64, i64, i64) {
        match self {
            Orientation::Parallel      => (1, 0, 0),
            Orientation::Perpendicular => (0, 0, 1),
        }
    }
}

impl FromStr for Orientation {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        lookup("orientation", s, &Self::TABLE)
    }
}

/// Radial position of the source on the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Center,
    Mid,
    Border,
}

impl Region {
    const TABLE: [(&'static str, Region); 3] = [
        ("center", Region::Center),
        ("mid", Region::Mid),
        ("border", Region::Border),
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Region::Center => "center",
            Region::Mid    => "mid",
            Region::Border => "border",
        }
    }

    /// Source x offset in mm.
    pub fn x_offset(self) -> i64 {
        match self {
            Region::Center => 0,
            Region::Mid    => 90,
            Region::Border => 180,
        }
    }
}

impl FromStr for Region {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        lookup("region", s, &Self::TABLE)
    }
}

/// Mesh sagging distance in mm, kept verbatim as given so that paths and
/// macros show exactly what was asked for.
fn parse_sagging(s: &str) -> Result<String> {
    match s.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(s.trim().to_owned()),
        _ => Err(Error::InvalidCampaignVariant {
            param: "sagging",
            value: s.to_owned(),
            allowed: vec!["a non-negative distance in mm".to_owned()],
        }),
    }
}

// -----------------------------------------------------------------------------
// Descriptor
// -----------------------------------------------------------------------------

/// Everything that distinguishes one production campaign from another.
#[derive(Debug, Clone)]
pub struct Campaign {
    pub name:          &'static str,
    pub nevents:       u64,
    pub nfiles:        u64,
    /// Relative to the data root; may reference `params`.
    pub path_template: &'static str,
    pub templates:     TemplateNames,
    pub params:        Context,
    pub naming:        NamingRule,
}

fn names(init: &str, config: &str) -> TemplateNames {
    TemplateNames {
        init:   init.to_owned(),
        config: config.to_owned(),
        job:    JOB_TEMPLATE.to_owned(),
    }
}

impl Campaign {
    pub fn geantino() -> Self {
        Self {
            name:          "geantino",
            nevents:       10_000_000,
            nfiles:        1000,
            path_template: "ELsim/mesh_debug",
            templates:     names("new_geantino.init.template", "new_geantino.config.template"),
            params:        Context::new(),
            naming:        NamingRule::INDEXED.with_data("geantino_{index}.next"),
        }
    }

    pub fn mesh_performance(meshtype: &str) -> Result<Self> {
        let mesh: MeshType = meshtype.parse()?;
        let params = Context::new()
            .with("meshtype", mesh.as_str())
            .with("use_mesh", matches!(mesh, MeshType::Real | MeshType::Sagg))
            .with("sagging", i64::from(mesh == MeshType::Sagg))
            .with("x", 0_i64)
            .with("y", 0_i64)
            .with("z", 10_i64);
        Ok(Self {
            name:          "mesh-performance",
            nevents:       3 * 31,
            nfiles:        3,
            path_template: "ELsim/mesh_performance/{meshtype}",
            templates:     names(
                "new_mesh_performance.init.template",
                "new_mesh_performance.config.template",
            ),
            params,
            naming:        NamingRule::INDEXED,
        })
    }

    pub fn orientation(orientation: &str) -> Result<Self> {
        let o: Orientation = orientation.parse()?;
        let (px, py, pz) = o.direction();
        let params = Context::new()
            .with("orientation", o.as_str())
            .with("x", 0_i64)
            .with("y", 0_i64)
            .with("z", 250_i64)
            .with("px", px)
            .with("py", py)
            .with("pz", pz);
        Ok(Self {
            name:          "orientation",
            nevents:       2000,
            nfiles:        10,
            path_template: "zlength/track_orientation/{orientation}",
            templates:     names("NEW_track.init.template", "NEW_track.config.template"),
            params,
            naming:        NamingRule::INDEXED.with_data("nexus_{orientation}_{index}.next"),
        })
    }

    pub fn photo(region: &str) -> Result<Self> {
        let r: Region = region.parse()?;
        Ok(Self {
            name:          "photo",
            nevents:       10,
            nfiles:        1,
            path_template: "ELsim/photo/{region}",
            templates:     names(
                "new_photon_tracking.init.template",
                &format!("new_photon_tracking.config.{}.template", r.as_str()),
            ),
            params:        Context::new().with("region", r.as_str()),
            naming:        NamingRule {
                init:   "{region}.{index}.mac",
                config: "{index}.mac",
                job:    "{region}.{index}.sh",
                log:    "{region}_{index}.txt",
                data:   "{region}_{index}.next",
            },
        })
    }

    pub fn transparency(meshtype: &str, region: &str) -> Result<Self> {
        let mesh: MeshType = meshtype.parse()?;
        if mesh == MeshType::Sagg {
            return Err(Error::InvalidCampaignVariant {
                param:   "meshtype",
                value:   meshtype.to_owned(),
                allowed: vec!["none".to_owned(), "real".to_owned()],
            });
        }
        let r: Region = region.parse()?;
        let params = Context::new()
            .with("meshtype", mesh.as_str())
            .with("use_mesh", mesh == MeshType::Real)
            .with("region", r.as_str())
            .with("x", r.x_offset())
            .with("y", 0_i64)
            .with("z", 10_i64);
        Ok(Self {
            name:          "transparency",
            nevents:       20,
            nfiles:        1,
            path_template: "ELsim/transparency/{meshtype}/{region}",
            templates:     names(
                "new_mesh_transparency.init.template",
                "new_mesh_transparency.config.template",
            ),
            params,
            naming:        NamingRule::INDEXED,
        })
    }

    pub fn transparency_sagg(sagging: &str, region: &str) -> Result<Self> {
        let sagging = parse_sagging(sagging)?;
        let r: Region = region.parse()?;
        let params = Context::new()
            .with("sagging", sagging.as_str())
            .with("mesh_sagging", sagging.as_str())
            .with("region", r.as_str())
            .with("x", r.x_offset())
            .with("y", 0_i64)
            .with("z", 10_i64);
        Ok(Self {
            name:          "transparency-sagg",
            nevents:       20,
            nfiles:        1,
            path_template: "ELsim/transparency/{sagging}mm/{region}",
            templates:     names(
                "new_mesh_transparency_sagg.init.template",
                "new_mesh_transparency_sagg.config.template",
            ),
            params,
            naming:        NamingRule::INDEXED,
        })
    }

    /// Override the event budget and/or the number of files.
    pub fn with_events(mut self, nevents: Option<u64>, nfiles: Option<u64>) -> Self {
        if let Some(n) = nevents { self.nevents = n; }
        if let Some(n) = nfiles  { self.nfiles  = n; }
        self
    }

    /// Events per file. The remainder of the division is dropped.
    pub fn events_per_file(&self) -> Result<u64> {
        if self.nfiles == 0 {
            return Err(Error::InvalidConfig(format!(
                "campaign {} has nfiles = 0", self.name
            )));
        }
        Ok(self.nevents / self.nfiles)
    }

    /// Events that no file references.
    pub fn dropped_events(&self) -> Result<u64> {
        let per_file = self.events_per_file()?;
        Ok(self.nevents - per_file * self.nfiles)
    }
}

/// Static description of a campaign for listings.
#[derive(Debug, Clone, Copy)]
pub struct CampaignInfo {
    pub name:    &'static str,
    pub args:    &'static str,
    pub nevents: u64,
    pub nfiles:  u64,
    pub path:    &'static str,
}

pub const CATALOG: [CampaignInfo; 6] = [
    CampaignInfo { name: "geantino",          args: "",                                  nevents: 10_000_000, nfiles: 1000, path: "ELsim/mesh_debug" },
    CampaignInfo { name: "mesh-performance",  args: "<none|real|sagg>",                  nevents: 93,         nfiles: 3,    path: "ELsim/mesh_performance/{meshtype}" },
    CampaignInfo { name: "orientation",       args: "<parallel|perpendicular>",          nevents: 2000,       nfiles: 10,   path: "zlength/track_orientation/{orientation}" },
    CampaignInfo { name: "photo",             args: "<center|mid|border>",               nevents: 10,         nfiles: 1,    path: "ELsim/photo/{region}" },
    CampaignInfo { name: "transparency",      args: "<none|real> <center|mid|border>",   nevents: 20,         nfiles: 1,    path: "ELsim/transparency/{meshtype}/{region}" },
    CampaignInfo { name: "transparency-sagg", args: "<mm> <center|mid|border>",          nevents: 20,         nfiles: 1,    path: "ELsim/transparency/{sagging}mm/{region}" },
];
